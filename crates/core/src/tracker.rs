use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

const MIB: f64 = 1024.0 * 1024.0;

/// Running byte count for one session. Never reset.
#[derive(Debug)]
pub struct ThroughputTracker {
    total_bytes: u64,
    messages: u64,
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputSnapshot {
    pub total_bytes: u64,
    pub messages: u64,
    pub elapsed: Duration,
}

impl Default for ThroughputTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self {
            total_bytes: 0,
            messages: 0,
            started: Instant::now(),
        }
    }

    /// Records one accepted message of `n` bytes.
    pub fn add(&mut self, n: u64) {
        self.total_bytes = self.total_bytes.saturating_add(n);
        self.messages += 1;
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn snapshot(&self) -> ThroughputSnapshot {
        ThroughputSnapshot {
            total_bytes: self.total_bytes,
            messages: self.messages,
            elapsed: self.started.elapsed(),
        }
    }
}

impl ThroughputSnapshot {
    pub fn total_mib(&self) -> f64 {
        self.total_bytes as f64 / MIB
    }

    /// Average rate since the session started, in KiB/s.
    pub fn kib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / 1024.0 / secs
    }
}

impl fmt::Display for ThroughputSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes ({:.2} MiB)", self.total_bytes, self.total_mib())
    }
}
