use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub handshake_timeout: Duration,
    /// Accept self-signed or mismatched certificates on `wss://` endpoints.
    pub accept_invalid_certs: bool,
    /// Capacity of the event queue handed to the session.
    pub event_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
            event_buffer: 256,
        }
    }
}

impl TransportConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = TransportConfig::default();

        if let Some(v) = lookup("WSREADER_HANDSHAKE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.handshake_timeout = Duration::from_secs(s);
            }
        }
        if let Some(v) = lookup("WSREADER_ACCEPT_INVALID_CERTS") {
            if let Some(b) = parse_bool(&v) {
                cfg.accept_invalid_certs = b;
            }
        }
        if let Some(v) = lookup("WSREADER_EVENT_BUFFER") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    cfg.event_buffer = n;
                }
            }
        }

        cfg
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = TransportConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(10));
        assert!(cfg.accept_invalid_certs);
        assert_eq!(cfg.event_buffer, 256);
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = TransportConfig::from_lookup(lookup(&[
            ("WSREADER_HANDSHAKE_TIMEOUT_SECS", "3"),
            ("WSREADER_ACCEPT_INVALID_CERTS", "no"),
            ("WSREADER_EVENT_BUFFER", "16"),
        ]));
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(3));
        assert!(!cfg.accept_invalid_certs);
        assert_eq!(cfg.event_buffer, 16);
    }

    #[test]
    fn malformed_values_are_ignored() {
        let cfg = TransportConfig::from_lookup(lookup(&[
            ("WSREADER_HANDSHAKE_TIMEOUT_SECS", "soon"),
            ("WSREADER_ACCEPT_INVALID_CERTS", "maybe"),
            ("WSREADER_EVENT_BUFFER", "0"),
        ]));
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(10));
        assert!(cfg.accept_invalid_certs);
        assert_eq!(cfg.event_buffer, 256);
    }
}
