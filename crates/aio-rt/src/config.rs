// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime configuration.
//!
//! Loaded from a JSON file, then overridden from the environment:
//! `AIO_BACKEND` (`poll` / `epoll`) and `AIO_LOG` (tracing filter).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Readiness-multiplexing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Poll,
    Epoll,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(Backend::Poll),
            "epoll" => Ok(Backend::Epoll),
            _ => Err(ConfigError::InvalidValue {
                key: "backend",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Poll => write!(f, "poll"),
            Backend::Epoll => write!(f, "epoll"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Multiplexing backend used by the scheduler.
    pub backend: Backend,
    /// Events fetched per `epoll_wait`.
    pub max_events: usize,
    /// `listen(2)` backlog for sockets built by the socket factories.
    pub listen_backlog: i32,
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Poll,
            max_events: 64,
            listen_backlog: 128,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(s: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text, path)
    }

    /// Apply `AIO_BACKEND` / `AIO_LOG` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(backend) = lookup("AIO_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(filter) = lookup("AIO_LOG") {
            self.log_filter = filter;
        }
        Ok(self)
    }
}
