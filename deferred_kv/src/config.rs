use std::fmt;

use crate::error::Error;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1982;

pub const HOST_ENV: &str = "DEFERRED_KV_HOST";
pub const PORT_ENV: &str = "DEFERRED_KV_PORT";

/// Coordinator the store client connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Defaults overridden by `DEFERRED_KV_HOST` and `DEFERRED_KV_PORT`
    ///
    /// # Errors
    /// `Error::Config` if the port is not a number in `1..=65535`, or the
    /// host is empty
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(host) = lookup(HOST_ENV) {
            if host.trim().is_empty() {
                return Err(Error::Config(format!("{HOST_ENV} is empty")));
            }
            config.host = host.trim().to_string();
        }
        if let Some(port) = lookup(PORT_ENV) {
            config.port = match port.trim().parse::<u16>() {
                Ok(0) | Err(_) => {
                    return Err(Error::Config(format!(
                        "{PORT_ENV} is not a valid port: {port:?}"
                    )))
                }
                Ok(port) => port,
            };
        }
        Ok(config)
    }
}
