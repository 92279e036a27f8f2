//! Daemon configuration from environment variables.
//!
//! - `MCQD_WORKSPACE`: workspace directory opened at startup (optional; a
//!   client can still pick one with `workspace.select`)
//! - `MCQD_BUSY_TIMEOUT_MS`: how long a write waits on a locked database
//!   before failing (default `5000`)
//!
//! Log filtering is read separately from `RUST_LOG`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_WORKSPACE: &str = "MCQD_WORKSPACE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "MCQD_BUSY_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub workspace: Option<PathBuf>,
    pub busy_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            busy_timeout: Duration::from_millis(Self::DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl DaemonConfig {
    pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let workspace = get(ENV_WORKSPACE).map(PathBuf::from);

        let busy_timeout = match get(ENV_BUSY_TIMEOUT_MS) {
            None => Duration::from_millis(Self::DEFAULT_BUSY_TIMEOUT_MS),
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    name: ENV_BUSY_TIMEOUT_MS,
                    message: format!("{raw:?} is not a millisecond count ({e})"),
                })?;
                Duration::from_millis(ms)
            }
        };

        Ok(Self {
            workspace,
            busy_timeout,
        })
    }
}
