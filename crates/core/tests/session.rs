use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use wsreader_core::{
    ByteSink, ExistingFile, FileSink, Notification, Reporter, SessionConfig, SessionError,
    SessionState, StreamSession, TerminationReason, TransportAdapter, TransportEvent,
    ABNORMAL_CLOSURE,
};

/// Replays a fixed list of events. Optionally answers close requests with `Closed`.
struct ScriptedTransport {
    script: Vec<TransportEvent>,
    keep_open: bool,
    reply_to_close: bool,
    tx: Option<mpsc::Sender<TransportEvent>>,
    close_requests: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn new(script: Vec<TransportEvent>) -> Self {
        Self {
            script,
            keep_open: true,
            reply_to_close: true,
            tx: None,
            close_requests: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl TransportAdapter for ScriptedTransport {
    fn start(&mut self, _url: &str) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(self.script.len() + 4);
        for event in self.script.drain(..) {
            tx.try_send(event).unwrap();
        }
        if self.keep_open {
            self.tx = Some(tx);
        }
        rx
    }

    fn request_close(&self) {
        self.close_requests.fetch_add(1, Ordering::SeqCst);
        if self.reply_to_close {
            if let Some(tx) = &self.tx {
                let _ = tx.try_send(TransportEvent::Closed {
                    code: 1000,
                    reason: "requested".into(),
                });
            }
        }
    }
}

/// Accepts writes until `budget` bytes have been taken, then fails like a full disk.
struct FullDiskSink {
    budget: usize,
    active: bool,
    accepted: Arc<Mutex<Vec<u8>>>,
    closes: Arc<AtomicUsize>,
}

impl ByteSink for FullDiskSink {
    fn write(&mut self, bytes: &[u8]) -> wsreader_core::Result<()> {
        let mut accepted = self.accepted.lock().unwrap();
        if accepted.len() + bytes.len() > self.budget {
            return Err(SessionError::sink_write(
                "full.ts",
                io::Error::new(io::ErrorKind::Other, "no space left on device"),
            ));
        }
        accepted.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> wsreader_core::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(Path::new("full.ts"))
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// A real output file that runs out of space after `budget` bytes.
struct CappedFileSink {
    inner: FileSink,
    budget: u64,
}

impl ByteSink for CappedFileSink {
    fn write(&mut self, bytes: &[u8]) -> wsreader_core::Result<()> {
        if self.inner.committed() + bytes.len() as u64 > self.budget {
            return Err(SessionError::sink_write(
                self.inner.path().unwrap_or(Path::new("capped.ts")),
                io::Error::new(io::ErrorKind::Other, "no space left on device"),
            ));
        }
        self.inner.write(bytes)
    }

    fn close(&mut self) -> wsreader_core::Result<()> {
        self.inner.close()
    }

    fn path(&self) -> Option<&Path> {
        self.inner.path()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

fn recording() -> (Arc<Mutex<Vec<Notification>>>, impl Reporter + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();
    (seen, move |n: Notification| out.lock().unwrap().push(n))
}

fn closed_total(seen: &[Notification]) -> Option<u64> {
    seen.iter().find_map(|n| match n {
        Notification::Closed { total_bytes, .. } => Some(*total_bytes),
        _ => None,
    })
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

fn server_close() -> TransportEvent {
    TransportEvent::Closed {
        code: 1000,
        reason: "end of stream".into(),
    }
}

#[tokio::test]
async fn counts_bytes_without_output() {
    let (seen, reporter) = recording();
    let mut session = StreamSession::new(SessionConfig::new("ws://stream"), reporter).unwrap();
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(vec![0; 1024]),
        TransportEvent::binary(vec![0; 2048]),
        TransportEvent::binary(vec![0; 512]),
        server_close(),
    ]);

    let reason = session.connect(&mut transport, never()).await;

    assert_eq!(
        reason,
        TerminationReason::Closed { code: 1000, reason: "end of stream".into() }
    );
    let snap = session.snapshot();
    assert_eq!(snap.total_bytes, 3584);
    assert_eq!(format!("{:.2}", snap.total_mib()), "0.00");

    let seen = seen.lock().unwrap();
    assert_eq!(closed_total(&seen), Some(3584));
    assert!(!seen.iter().any(|n| matches!(n, Notification::Saved { .. })));
    assert!(!seen.iter().any(|n| matches!(n, Notification::MessageReceived { .. })));
}

#[tokio::test]
async fn persists_payloads_in_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.ts");
    let mut config = SessionConfig::new("ws://stream");
    config.output = Some(path.clone());

    let (seen, reporter) = recording();
    let mut session = StreamSession::new(config, reporter).unwrap();
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(b"AAA".to_vec()),
        TransportEvent::binary(b"BBBB".to_vec()),
        server_close(),
    ]);

    session.connect(&mut transport, never()).await;

    assert_eq!(std::fs::read(&path).unwrap(), b"AAABBBB");
    assert_eq!(session.snapshot().total_bytes, 7);

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[..3],
        [
            Notification::Connecting { url: "ws://stream".into() },
            Notification::Connected { url: "ws://stream".into() },
            Notification::WillPersist { path: path.clone() },
        ]
    );
    assert_eq!(seen.last(), Some(&Notification::Saved { path }));
}

#[tokio::test]
async fn sink_failure_closes_session_and_keeps_earlier_bytes() {
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let closes = Arc::new(AtomicUsize::new(0));
    let sink = FullDiskSink {
        budget: 6,
        active: true,
        accepted: accepted.clone(),
        closes: closes.clone(),
    };
    let (seen, reporter) = recording();
    let mut session =
        StreamSession::with_sink(SessionConfig::new("ws://stream"), Box::new(sink), reporter);
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(b"AAA".to_vec()),
        TransportEvent::binary(b"BBBB".to_vec()),
        TransportEvent::binary(b"CC".to_vec()),
    ]);
    let close_requests = transport.close_requests.clone();

    let reason = session.connect(&mut transport, never()).await;

    assert!(matches!(reason, TerminationReason::SinkWriteError { .. }));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(close_requests.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(*accepted.lock().unwrap(), b"AAA");
    // Nothing after the failure is counted, even if it would have fit.
    assert_eq!(session.snapshot().total_bytes, 3);

    let seen = seen.lock().unwrap();
    assert_eq!(closed_total(&seen), Some(3));
    assert!(seen
        .iter()
        .any(|n| matches!(n, Notification::ErrorOccurred { message } if message.contains("no space"))));
}

#[tokio::test]
async fn interrupt_requests_close_and_summarises() {
    let (seen, reporter) = recording();
    let mut session = StreamSession::new(SessionConfig::new("ws://stream"), reporter).unwrap();
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(vec![1; 188]),
    ]);
    let close_requests = transport.close_requests.clone();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let interrupt = async {
        let _ = stop_rx.await;
    };
    stop_tx.send(()).unwrap();

    let reason = session.connect(&mut transport, interrupt).await;

    assert_eq!(reason, TerminationReason::UserInterrupt);
    assert_eq!(close_requests.load(Ordering::SeqCst), 1);
    let seen = seen.lock().unwrap();
    assert!(seen.contains(&Notification::UserInterrupted));
    assert_eq!(
        seen.iter()
            .filter(|n| matches!(n, Notification::Closed { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn handshake_failure_ends_as_transport_error() {
    let (seen, reporter) = recording();
    let mut session = StreamSession::new(SessionConfig::new("wss://unreachable"), reporter).unwrap();
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Error("connection refused".into()),
        TransportEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: "handshake failed".into(),
        },
    ]);

    let reason = session.connect(&mut transport, never()).await;

    assert_eq!(
        reason,
        TerminationReason::TransportError { message: "connection refused".into() }
    );
    let seen = seen.lock().unwrap();
    assert!(!seen.iter().any(|n| matches!(n, Notification::Connected { .. })));
    assert_eq!(closed_total(&seen), Some(0));
}

#[tokio::test]
async fn unanswered_close_request_times_out() {
    let (_, reporter) = recording();
    let mut config = SessionConfig::new("ws://stream");
    config.close_grace = Duration::from_millis(20);
    let mut session = StreamSession::new(config, reporter).unwrap();
    let mut transport = ScriptedTransport::new(vec![TransportEvent::Opened]);
    transport.reply_to_close = false;

    let reason = session.connect(&mut transport, async {}).await;

    assert_eq!(reason, TerminationReason::UserInterrupt);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn queue_ending_without_close_still_closes_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.ts");
    let mut config = SessionConfig::new("ws://stream");
    config.output = Some(path.clone());

    let (seen, reporter) = recording();
    let mut session = StreamSession::new(config, reporter).unwrap();
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(b"partial".to_vec()),
    ]);
    transport.keep_open = false;

    let reason = session.connect(&mut transport, never()).await;

    assert_eq!(
        reason,
        TerminationReason::Closed {
            code: ABNORMAL_CLOSURE,
            reason: "transport ended".into()
        }
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"partial");
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&Notification::Saved { path }));
}

#[tokio::test]
async fn closed_session_is_not_reused() {
    let (_, reporter) = recording();
    let mut session = StreamSession::new(SessionConfig::new("ws://stream"), reporter).unwrap();
    let mut first = ScriptedTransport::new(vec![TransportEvent::Opened, server_close()]);
    session.connect(&mut first, never()).await;

    let mut second = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(vec![0; 100]),
    ]);
    let reason = session.connect(&mut second, never()).await;

    assert!(matches!(reason, TerminationReason::Closed { code: 1000, .. }));
    assert_eq!(session.snapshot().total_bytes, 0);
}

#[tokio::test]
async fn output_file_holds_only_bytes_accepted_before_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.ts");
    let sink = CappedFileSink {
        inner: FileSink::open(&path, ExistingFile::Overwrite).unwrap(),
        budget: 8,
    };
    let (seen, reporter) = recording();
    let mut session =
        StreamSession::with_sink(SessionConfig::new("ws://stream"), Box::new(sink), reporter);
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(b"AAA".to_vec()),
        TransportEvent::binary(b"BBBB".to_vec()),
        TransportEvent::binary(b"CCCC".to_vec()),
        TransportEvent::binary(b"D".to_vec()),
    ]);

    let reason = session.connect(&mut transport, never()).await;

    assert!(matches!(reason, TerminationReason::SinkWriteError { .. }));
    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk, b"AAABBBB");
    assert_eq!(session.snapshot().total_bytes, on_disk.len() as u64);

    let seen = seen.lock().unwrap();
    assert_eq!(closed_total(&seen), Some(7));
    assert_eq!(seen.last(), Some(&Notification::Saved { path }));
}

#[tokio::test]
async fn inactive_sink_is_not_closed() {
    let closes = Arc::new(AtomicUsize::new(0));
    let sink = FullDiskSink {
        budget: usize::MAX,
        active: false,
        accepted: Arc::new(Mutex::new(Vec::new())),
        closes: closes.clone(),
    };
    let (seen, reporter) = recording();
    let mut session =
        StreamSession::with_sink(SessionConfig::new("ws://stream"), Box::new(sink), reporter);
    let mut transport = ScriptedTransport::new(vec![
        TransportEvent::Opened,
        TransportEvent::binary(vec![0; 16]),
        server_close(),
    ]);

    session.connect(&mut transport, never()).await;

    assert_eq!(closes.load(Ordering::SeqCst), 0);
    let seen = seen.lock().unwrap();
    assert_eq!(closed_total(&seen), Some(16));
    assert!(!seen.iter().any(|n| matches!(n, Notification::Saved { .. })));
}
