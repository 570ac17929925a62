use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;
use wsreader_core::{FrameKind, TransportAdapter, TransportEvent, ABNORMAL_CLOSURE};

use crate::config::TransportConfig;

// Close frame without a status code.
const NO_STATUS: u16 = 1005;
const NORMAL: u16 = 1000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("tls setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error(transparent)]
    WebSocket(#[from] WsError),
}

/// WebSocket client driving one connection on a background task.
///
/// Frames are forwarded to the session through a bounded queue, so a slow
/// sink applies backpressure to the socket instead of buffering unboundedly.
pub struct WsTransport {
    config: TransportConfig,
    close: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            close: Arc::new(Notify::new()),
            task: None,
        }
    }
}

impl TransportAdapter for WsTransport {
    fn start(&mut self, url: &str) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        if let Some(previous) = self.task.take() {
            previous.abort();
        }
        // A close requested for an earlier connection must not end this one.
        self.close = Arc::new(Notify::new());
        let url = url.to_string();
        let config = self.config.clone();
        let close = self.close.clone();
        self.task = Some(tokio::spawn(async move {
            run_connection(url, config, tx, close).await;
        }));
        rx
    }

    fn request_close(&self) {
        self.close.notify_one();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn tls_connector(config: &TransportConfig) -> Result<Option<Connector>, TransportError> {
    if !config.accept_invalid_certs {
        return Ok(None);
    }
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(Some(Connector::NativeTls(tls)))
}

fn validate_url(url: &str) -> Result<(), TransportError> {
    let invalid = |reason: String| TransportError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

async fn open(url: &str, config: &TransportConfig) -> Result<WsStream, TransportError> {
    validate_url(url)?;
    let connector = tls_connector(config)?;
    let (stream, response) = connect_async_tls_with_config(url, None, false, connector).await?;
    debug!(status = %response.status(), "handshake complete");
    Ok(stream)
}

async fn fail(events: &mpsc::Sender<TransportEvent>, err: TransportError, reason: &str) {
    warn!(error = %err, "websocket connect failed");
    let _ = events.send(TransportEvent::Error(err.to_string())).await;
    let _ = events
        .send(TransportEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: reason.to_string(),
        })
        .await;
}

async fn run_connection(
    url: String,
    config: TransportConfig,
    events: mpsc::Sender<TransportEvent>,
    close: Arc<Notify>,
) {
    let stream = tokio::select! {
        res = timeout(config.handshake_timeout, open(&url, &config)) => match res {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                fail(&events, err, "handshake failed").await;
                return;
            }
            Err(_) => {
                let err = TransportError::HandshakeTimeout(config.handshake_timeout);
                fail(&events, err, "handshake timed out").await;
                return;
            }
        },
        _ = close.notified() => {
            info!("close requested before the handshake completed");
            let _ = events
                .send(TransportEvent::Closed { code: NORMAL, reason: "closed before open".into() })
                .await;
            return;
        }
    };

    info!(%url, "websocket open");
    if events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();
    let mut closing = false;
    let mut close_frame: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Binary(payload))) => {
                    let event = TransportEvent::Message { kind: FrameKind::Binary, payload };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    let event = TransportEvent::Message {
                        kind: FrameKind::Text,
                        payload: text.into_bytes(),
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((NO_STATUS, String::new()));
                    debug!(code, %reason, "close frame received");
                    close_frame = Some((code, reason));
                }
                Some(Ok(other)) => trace!(?other, "control frame"),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => break,
                Some(Err(err)) => {
                    warn!(error = %err, "websocket read failed");
                    let _ = events.send(TransportEvent::Error(err.to_string())).await;
                    break;
                }
            },
            _ = close.notified(), if !closing => {
                closing = true;
                debug!("sending close frame");
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closing".into(),
                };
                if let Err(err) = write.send(Message::Close(Some(frame))).await {
                    warn!(error = %err, "sending close frame failed");
                    let _ = events.send(TransportEvent::Error(err.to_string())).await;
                    break;
                }
            }
        }
    }

    let (code, reason) =
        close_frame.unwrap_or_else(|| (ABNORMAL_CLOSURE, "connection dropped".to_string()));
    info!(code, %reason, "websocket closed");
    let _ = events.send(TransportEvent::Closed { code, reason }).await;
}
