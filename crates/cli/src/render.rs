use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::warn;
use wsreader_core::{Notification, Reporter};

/// Prints session notifications to the terminal.
pub struct ConsoleReporter {
    json: bool,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: DateTime<Local>,
    #[serde(flatten)]
    notification: &'a Notification,
}

impl ConsoleReporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, notification: Notification) {
        if self.json {
            let line = JsonLine {
                ts: Local::now(),
                notification: &notification,
            };
            match serde_json::to_string(&line) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "failed to encode notification"),
            }
            return;
        }

        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        let text = render(&notification);
        match notification {
            Notification::ErrorOccurred { .. } => eprintln!("[{ts}] {text}"),
            _ => println!("[{ts}] {text}"),
        }
    }
}

pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::Connecting { url } => format!("connecting to {url}"),
        Notification::Connected { url } => format!("connected to {url}"),
        Notification::WillPersist { path } => format!("saving stream to {}", path.display()),
        Notification::MessageReceived { size, running_total } => {
            format!("received {size} bytes | total {running_total} bytes")
        }
        Notification::ErrorOccurred { message } => format!("error: {message}"),
        Notification::UserInterrupted => "stopped by user".to_string(),
        Notification::Closed {
            code,
            reason,
            total_bytes,
            total_mib,
            messages,
            elapsed_secs,
            kib_per_sec,
        } => {
            let reason = if reason.is_empty() {
                String::new()
            } else {
                format!(" {reason}")
            };
            format!(
                "connection closed ({code}{reason}) | {total_bytes} bytes ({total_mib:.2} MiB) in {messages} messages over {elapsed_secs:.1}s ({kib_per_sec:.2} KiB/s)"
            )
        }
        Notification::Saved { path } => format!("saved to {}", path.display()),
    }
}
