use std::process::exit;

use tokio::time::{timeout, Duration};
use url::Url;
use wsreader_core::{FrameKind, TransportAdapter, TransportEvent};
use wsreader_transport::{TransportConfig, WsTransport};

const PREVIEW_BYTES: usize = 100;

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "ws://127.0.0.1:8082/live".to_string());
    let wait_secs = args.next().and_then(|s| s.parse().ok()).unwrap_or(5u64);

    match Url::parse(&url) {
        Ok(parsed) => describe(&parsed),
        Err(e) => {
            eprintln!("Invalid URL {}: {}", url, e);
            exit(2);
        }
    }

    eprintln!("Connecting to {}", url);
    let mut transport = WsTransport::new(TransportConfig::from_env());
    let mut events = transport.start(&url);

    // Wait for the first payload frame, then print it and exit
    let first = timeout(Duration::from_secs(wait_secs), async {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Opened => eprintln!("Connected"),
                TransportEvent::Message { kind, payload } => return Ok(Some((kind, payload))),
                TransportEvent::Error(e) => return Err(e),
                TransportEvent::Closed { code, reason } => {
                    eprintln!("Closed by server ({} {})", code, reason);
                    return Ok(None);
                }
            }
        }
        Ok(None)
    })
    .await;

    match first {
        Ok(Ok(Some((kind, payload)))) => {
            let shown = payload.len().min(PREVIEW_BYTES);
            let kind = match kind {
                FrameKind::Binary => "binary",
                FrameKind::Text => "text",
            };
            println!("First frame: {} bytes ({})", payload.len(), kind);
            println!("Container: {}", guess_container(&payload));
            println!("First {} bytes (hex): {}", shown, hex::encode(&payload[..shown]));
            transport.request_close();
            let _ = timeout(Duration::from_secs(1), async {
                while let Some(event) = events.recv().await {
                    if matches!(event, TransportEvent::Closed { .. }) {
                        break;
                    }
                }
            })
            .await;
        }
        Ok(Err(e)) => {
            eprintln!("WS receive error: {}", e);
            exit(2);
        }
        Ok(Ok(None)) => {
            eprintln!("WS closed before any frame");
            exit(3);
        }
        Err(_) => {
            eprintln!("Timeout waiting for the first frame");
            exit(4);
        }
    }
}

fn describe(url: &Url) {
    println!("Scheme: {}", url.scheme());
    println!("Host: {}", url.host_str().unwrap_or("-"));
    if let Some(port) = url.port_or_known_default() {
        println!("Port: {}", port);
    }
    println!("Path: {}", url.path());
    for (key, value) in url.query_pairs() {
        println!("Query {}: {}", key, value);
    }
}

/// Best guess at the media container from the first bytes of a frame.
fn guess_container(header: &[u8]) -> &'static str {
    match header {
        [0x47, ..] => "MPEG-TS",
        [0x00, 0x00, 0x01, ..] => "MPEG video",
        [0xff, 0xf1, ..] | [0xff, 0xf9, ..] => "AAC (ADTS)",
        [0x1a, 0x45, 0xdf, 0xa3, ..] => "WebM/Matroska",
        [_, _, _, _, b'f', b't', b'y', b'p', ..] | [b'f', b't', b'y', b'p', ..] => "MP4",
        _ => "unknown",
    }
}
