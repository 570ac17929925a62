use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use wsreader_core::{ExistingFile, SessionConfig};

pub const DEFAULT_URL: &str = "wss://103.237.103.54:60000/live?oid=2lanhaif80b44fbzbuxhpg495m7znkv4";

/// Read an IPTV transport stream from a WebSocket endpoint.
#[derive(Debug, Parser)]
#[command(name = "wsreader", version, about)]
pub struct Args {
    /// WebSocket URL of the stream
    #[arg(env = "WSREADER_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Save received bytes to this file
    #[arg(short, long, env = "WSREADER_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Report every received message
    #[arg(short, long)]
    pub verbose: bool,

    /// Print notifications as JSON lines
    #[arg(long)]
    pub json: bool,

    /// What to do if the output file already exists
    #[arg(long, value_enum, default_value_t = IfExists::Overwrite)]
    pub if_exists: IfExists,

    /// Milliseconds to wait for the server to acknowledge a close
    #[arg(long, env = "WSREADER_CLOSE_GRACE_MS", default_value_t = 500)]
    pub close_grace_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IfExists {
    Overwrite,
    Append,
    Fail,
}

impl From<IfExists> for ExistingFile {
    fn from(v: IfExists) -> Self {
        match v {
            IfExists::Overwrite => ExistingFile::Overwrite,
            IfExists::Append => ExistingFile::Append,
            IfExists::Fail => ExistingFile::Fail,
        }
    }
}

impl Args {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.url.clone(),
            output: self.output.clone(),
            verbose: self.verbose,
            existing_file: self.if_exists.into(),
            close_grace: Duration::from_millis(self.close_grace_ms),
        }
    }
}
