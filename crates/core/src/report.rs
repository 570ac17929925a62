use std::path::PathBuf;

use serde::Serialize;

/// Lifecycle notifications emitted by a session, in the order they happen.
/// Rendering is up to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Connecting {
        url: String,
    },
    Connected {
        url: String,
    },
    WillPersist {
        path: PathBuf,
    },
    /// Only emitted in verbose mode.
    MessageReceived {
        size: u64,
        running_total: u64,
    },
    ErrorOccurred {
        message: String,
    },
    UserInterrupted,
    Closed {
        code: u16,
        reason: String,
        total_bytes: u64,
        total_mib: f64,
        messages: u64,
        elapsed_secs: f64,
        /// Average rate over the whole session.
        kib_per_sec: f64,
    },
    Saved {
        path: PathBuf,
    },
}

pub trait Reporter: Send {
    fn report(&mut self, notification: Notification);
}

impl<F> Reporter for F
where
    F: FnMut(Notification) + Send,
{
    fn report(&mut self, notification: Notification) {
        self(notification)
    }
}
