pub mod config;
pub mod client;

pub use config::TransportConfig;
pub use client::{TransportError, WsTransport};
