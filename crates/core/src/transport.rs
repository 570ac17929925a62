//! The contract between a session and whatever speaks WebSocket for it.

use tokio::sync::mpsc;

/// Close code used when the connection ends without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// How a payload arrived on the wire. Both kinds are stored as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Binary,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message { kind: FrameKind, payload: Vec<u8> },
    Error(String),
    Closed { code: u16, reason: String },
}

/// Handlers for the four transport events. Invoked one at a time, never concurrently.
pub trait TransportEvents {
    fn on_open(&mut self);
    fn on_message(&mut self, payload: &[u8]);
    fn on_error(&mut self, err: &str);
    fn on_close(&mut self, code: u16, reason: &str);
}

impl TransportEvent {
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        TransportEvent::Message {
            kind: FrameKind::Binary,
            payload: payload.into(),
        }
    }

    pub fn dispatch<H: TransportEvents + ?Sized>(self, handler: &mut H) {
        match self {
            TransportEvent::Opened => handler.on_open(),
            TransportEvent::Message { payload, .. } => handler.on_message(&payload),
            TransportEvent::Error(err) => handler.on_error(&err),
            TransportEvent::Closed { code, reason } => handler.on_close(code, &reason),
        }
    }
}

pub trait TransportAdapter {
    /// Starts one connection attempt to `url`.
    ///
    /// Events are queued in delivery order on the returned receiver, which
    /// acts as the single-owner event queue for the session. A well-behaved
    /// transport ends the queue with exactly one `Closed`.
    fn start(&mut self, url: &str) -> mpsc::Receiver<TransportEvent>;

    /// Asks the transport to run its close sequence. Safe to call repeatedly.
    fn request_close(&self);
}
