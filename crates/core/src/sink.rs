//! Destinations for received stream bytes.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// What to do when the output file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingFile {
    /// Truncate and write from the start.
    #[default]
    Overwrite,
    /// Keep existing content and append after it.
    Append,
    /// Refuse to open; the session fails before connecting.
    Fail,
}

/// Where received payloads go.
///
/// A write either accepts the whole chunk or fails; it never leaves a partial
/// chunk behind. `close` is idempotent.
pub trait ByteSink: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Backing file, if the sink persists anything.
    fn path(&self) -> Option<&Path> {
        None
    }

    fn is_active(&self) -> bool;
}

/// Accepts everything and keeps nothing.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl ByteSink for DiscardSink {
    fn write(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }
}

/// Appends every chunk to a file and flushes it before returning.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
    // Length of the file after the last fully accepted chunk.
    committed: u64,
}

impl FileSink {
    pub fn open(path: impl Into<PathBuf>, existing: ExistingFile) -> Result<Self> {
        let path = path.into();
        let mut options = OpenOptions::new();
        options.write(true);
        match existing {
            ExistingFile::Overwrite => options.create(true).truncate(true),
            ExistingFile::Append => options.create(true).append(true),
            ExistingFile::Fail => options.create_new(true),
        };

        let opened = options.open(&path).and_then(|file| {
            let len = file.metadata()?.len();
            Ok((file, len))
        });
        let (file, committed) = match opened {
            Ok(v) => v,
            Err(source) => return Err(SessionError::SinkOpen { path, source }),
        };

        debug!(path = %path.display(), ?existing, offset = committed, "output file opened");
        Ok(Self {
            path,
            file: Some(file),
            committed,
        })
    }

    /// Bytes durably accepted so far, including pre-existing content in append mode.
    pub fn committed(&self) -> u64 {
        self.committed
    }
}

impl ByteSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(SessionError::sink_write(
                &self.path,
                io::Error::new(io::ErrorKind::NotConnected, "sink already closed"),
            ));
        };

        if let Err(source) = file.write_all(bytes).and_then(|_| file.flush()) {
            // Drop whatever part of the chunk made it to disk.
            let rollback = file
                .set_len(self.committed)
                .and_then(|_| file.seek(SeekFrom::Start(self.committed)));
            if let Err(err) = rollback {
                warn!(path = %self.path.display(), error = %err, "could not roll back partial write");
            }
            return Err(SessionError::sink_write(&self.path, source));
        }

        self.committed += bytes.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|source| SessionError::sink_write(&self.path, source))?;
        debug!(path = %self.path.display(), bytes = self.committed, "output file closed");
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn is_active(&self) -> bool {
        self.file.is_some()
    }
}
