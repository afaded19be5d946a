//! Listener configuration.

use crate::error::Error;

const HOST_VAR: &str = "SLUICE_HOST";
const PORT_VAR: &str = "SLUICE_PORT";
const MAX_BODY_VAR: &str = "SLUICE_MAX_BODY";

/// Default cap on a buffered request body: 2 MiB.
pub const DEFAULT_MAX_BODY: usize = 2 * 1024 * 1024;

/// Where the built-in listen mode binds, and whether it reacts to OS signals.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListenOptions {
    pub host: String,
    pub port: u16,
    /// Stop accepting on SIGTERM / Ctrl-C as well as on [`kill`](crate::Listener::kill).
    pub handle_signals: bool,
    /// Largest request body, in bytes, buffered before a step sees it.
    /// Longer bodies are answered with `413 Payload Too Large`.
    pub max_body: usize,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_owned(), port: 8000, handle_signals: true, max_body: DEFAULT_MAX_BODY }
    }
}

impl ListenOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    /// Reads `SLUICE_HOST`, `SLUICE_PORT` and `SLUICE_MAX_BODY`, falling back
    /// to the defaults.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `SLUICE_PORT` is not a valid port or
    /// `SLUICE_MAX_BODY` is not a byte count.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut options = Self::default();
        if let Some(host) = lookup(HOST_VAR) {
            options.host = host;
        }
        if let Some(port) = lookup(PORT_VAR) {
            options.port = port
                .trim()
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("{PORT_VAR}={port} is not a port")))?;
        }
        if let Some(limit) = lookup(MAX_BODY_VAR) {
            options.max_body = limit
                .trim()
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("{MAX_BODY_VAR}={limit} is not a byte count")))?;
        }
        Ok(options)
    }

    pub fn without_signals(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    pub fn with_max_body(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    /// `host:port`, as passed to the socket bind.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal.
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let options = ListenOptions::from_lookup(env(&[])).unwrap();
        assert_eq!(options, ListenOptions::default());
        assert_eq!(options.addr(), "0.0.0.0:8000");
    }

    #[test]
    fn reads_host_and_port() {
        let options =
            ListenOptions::from_lookup(env(&[("SLUICE_HOST", "127.0.0.1"), ("SLUICE_PORT", " 3000 ")]))
                .unwrap();
        assert_eq!(options.addr(), "127.0.0.1:3000");
        assert!(options.handle_signals);
        assert_eq!(options.max_body, DEFAULT_MAX_BODY);
    }

    #[test]
    fn reads_body_limit() {
        let options = ListenOptions::from_lookup(env(&[("SLUICE_MAX_BODY", "1024")])).unwrap();
        assert_eq!(options.max_body, 1024);
        assert_eq!(ListenOptions::default().with_max_body(16).max_body, 16);

        let err = ListenOptions::from_lookup(env(&[("SLUICE_MAX_BODY", "lots")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("SLUICE_MAX_BODY")));
    }

    #[test]
    fn brackets_ipv6_hosts() {
        assert_eq!(ListenOptions::new("::1", 80).addr(), "[::1]:80");
        assert_eq!(ListenOptions::new("[::1]", 80).addr(), "[::1]:80");
    }

    #[test]
    fn rejects_bad_port() {
        let err = ListenOptions::from_lookup(env(&[("SLUICE_PORT", "99999")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("99999")));
    }
}
