pub mod error;
pub mod report;
pub mod session;
pub mod sink;
pub mod tracker;
pub mod transport;

pub use error::{Result, SessionError};
pub use report::{Notification, Reporter};
pub use session::{SessionConfig, SessionState, StreamSession, TerminationReason};
pub use sink::{ByteSink, DiscardSink, ExistingFile, FileSink};
pub use tracker::{ThroughputSnapshot, ThroughputTracker};
pub use transport::{FrameKind, TransportAdapter, TransportEvent, TransportEvents, ABNORMAL_CLOSURE};
