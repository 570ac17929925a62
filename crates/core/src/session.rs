use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SessionError};
use crate::report::{Notification, Reporter};
use crate::sink::{ByteSink, DiscardSink, ExistingFile, FileSink};
use crate::tracker::{ThroughputSnapshot, ThroughputTracker};
use crate::transport::{TransportAdapter, TransportEvents, ABNORMAL_CLOSURE};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    /// `None` discards received bytes.
    pub output: Option<PathBuf>,
    pub verbose: bool,
    pub existing_file: ExistingFile,
    /// How long to wait for the transport to acknowledge a close request.
    pub close_grace: Duration,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output: None,
            verbose: false,
            existing_file: ExistingFile::default(),
            close_grace: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Why a session ended. The first cause recorded wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    Closed { code: u16, reason: String },
    TransportError { message: String },
    SinkWriteError { message: String },
    UserInterrupt,
}

/// One connection attempt, from connect to close.
pub struct StreamSession {
    config: SessionConfig,
    state: SessionState,
    sink: Box<dyn ByteSink>,
    tracker: ThroughputTracker,
    reporter: Box<dyn Reporter>,
    termination: Option<TerminationReason>,
    sink_failed: bool,
    shutdown_requested: bool,
}

impl StreamSession {
    /// Builds a session and opens its output file, if one is configured.
    pub fn new(config: SessionConfig, reporter: impl Reporter + 'static) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(SessionError::InvalidConfig("url must not be empty".into()));
        }
        let sink: Box<dyn ByteSink> = match &config.output {
            Some(path) => Box::new(FileSink::open(path, config.existing_file)?),
            None => Box::new(DiscardSink),
        };
        Ok(Self::with_sink(config, sink, reporter))
    }

    pub fn with_sink(
        config: SessionConfig,
        sink: Box<dyn ByteSink>,
        reporter: impl Reporter + 'static,
    ) -> Self {
        Self {
            config,
            state: SessionState::Connecting,
            sink,
            tracker: ThroughputTracker::new(),
            reporter: Box::new(reporter),
            termination: None,
            sink_failed: false,
            shutdown_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snapshot(&self) -> ThroughputSnapshot {
        self.tracker.snapshot()
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        self.termination.as_ref()
    }

    /// Runs the connection until it closes and reports why it ended.
    ///
    /// `interrupt` resolving is treated as an operator stop: the transport is
    /// asked to close and the session keeps draining events until `Closed`
    /// arrives or the close grace period runs out.
    pub async fn connect<T, F>(&mut self, transport: &mut T, interrupt: F) -> TerminationReason
    where
        T: TransportAdapter + ?Sized,
        F: Future<Output = ()>,
    {
        if self.state == SessionState::Closed {
            warn!(url = %self.config.url, "session already closed; not reconnecting");
            return self.termination_reason();
        }

        info!(url = %self.config.url, "connecting");
        self.reporter.report(Notification::Connecting {
            url: self.config.url.clone(),
        });

        let mut events = transport.start(&self.config.url);
        tokio::pin!(interrupt);
        let grace = sleep(self.config.close_grace);
        tokio::pin!(grace);

        let mut interrupted = false;
        let mut close_sent = false;

        while self.state != SessionState::Closed {
            if self.shutdown_requested && !close_sent {
                debug!("requesting transport close");
                transport.request_close();
                close_sent = true;
                grace.as_mut().reset(Instant::now() + self.config.close_grace);
            }

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event.dispatch(self),
                    None => {
                        warn!("transport event queue ended without a close");
                        self.on_close(ABNORMAL_CLOSURE, "transport ended");
                    }
                },
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    self.interrupt();
                }
                _ = &mut grace, if close_sent => {
                    warn!(grace = ?self.config.close_grace, "transport did not close in time");
                    self.on_close(ABNORMAL_CLOSURE, "close timed out");
                }
            }
        }

        self.termination_reason()
    }

    fn interrupt(&mut self) {
        info!("interrupted by user");
        self.reporter.report(Notification::UserInterrupted);
        self.termination.get_or_insert(TerminationReason::UserInterrupt);
        self.shutdown_requested = true;
    }

    fn termination_reason(&self) -> TerminationReason {
        self.termination
            .clone()
            .unwrap_or(TerminationReason::Closed {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
            })
    }
}

impl TransportEvents for StreamSession {
    fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            warn!(state = ?self.state, "ignoring open event");
            return;
        }
        self.state = SessionState::Open;
        info!(url = %self.config.url, "connected");
        self.reporter.report(Notification::Connected {
            url: self.config.url.clone(),
        });
        if let Some(path) = self.sink.path() {
            self.reporter.report(Notification::WillPersist {
                path: path.to_path_buf(),
            });
        }
    }

    fn on_message(&mut self, payload: &[u8]) {
        if self.state != SessionState::Open {
            warn!(state = ?self.state, size = payload.len(), "ignoring message outside open state");
            return;
        }
        if self.sink_failed {
            return;
        }

        if let Err(err) = self.sink.write(payload) {
            error!(error = %err, "persisting payload failed; shutting down");
            self.sink_failed = true;
            self.termination
                .get_or_insert(TerminationReason::SinkWriteError {
                    message: err.to_string(),
                });
            self.reporter.report(Notification::ErrorOccurred {
                message: err.to_string(),
            });
            self.shutdown_requested = true;
            return;
        }

        let size = payload.len() as u64;
        self.tracker.add(size);
        if self.config.verbose {
            self.reporter.report(Notification::MessageReceived {
                size,
                running_total: self.tracker.total_bytes(),
            });
        }
    }

    fn on_error(&mut self, err: &str) {
        error!(error = %err, "transport error");
        self.termination
            .get_or_insert_with(|| TerminationReason::TransportError {
                message: err.to_string(),
            });
        self.reporter.report(Notification::ErrorOccurred {
            message: err.to_string(),
        });
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        if self.state == SessionState::Closed {
            debug!(code, "duplicate close ignored");
            return;
        }
        self.state = SessionState::Closed;
        self.termination
            .get_or_insert_with(|| TerminationReason::Closed {
                code,
                reason: reason.to_string(),
            });

        let snap = self.tracker.snapshot();
        info!(code, reason, total = %snap, "connection closed");
        self.reporter.report(Notification::Closed {
            code,
            reason: reason.to_string(),
            total_bytes: snap.total_bytes,
            total_mib: snap.total_mib(),
            messages: snap.messages,
            elapsed_secs: snap.elapsed.as_secs_f64(),
            kib_per_sec: snap.kib_per_sec(),
        });

        if !self.sink.is_active() {
            return;
        }
        match self.sink.close() {
            Ok(()) => {
                if let Some(path) = self.sink.path() {
                    self.reporter.report(Notification::Saved {
                        path: path.to_path_buf(),
                    });
                }
            }
            Err(err) => {
                error!(error = %err, "closing output failed");
                self.reporter.report(Notification::ErrorOccurred {
                    message: err.to_string(),
                });
            }
        }
    }
}
