//! Server configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Where and how loudly to serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (`TETHER_HOST`, default `0.0.0.0`)
    pub host: String,
    /// Bind port (`TETHER_PORT`, default `3000`)
    pub port: u16,
    /// Fallback filter when `RUST_LOG` is unset (`TETHER_LOG`, default `info`)
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("TETHER_HOST").unwrap_or(defaults.host),
            port: env::var("TETHER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            log_level: env::var("TETHER_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// `host:port`, ready for `TcpListener::bind`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
