//! The engine settings. They get read from a JSON file like `TicTacToeConfig.json`:
//! ```json
//! { "bind_address": "0.0.0.0", "port": 6868, "tick_ms": 25, "auto_status_ms": 5000, "connect_timeout_ms": 5000 }
//! ```
//! All entries are optional, missing ones take the defaults shown above.

use protocol::DEFAULT_PORT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The address the server listens on in server mode.
    pub bind_address: String,
    /// The port used for listening and as the default port when connecting.
    pub port: u16,
    /// The length of one engine tick.
    pub tick_ms: u64,
    /// If a client did not hear anything from its server for this long, it asks for the status.
    pub auto_status_ms: u64,
    /// How long we wait for an outbound connection before giving up.
    pub connect_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_ms: 25,
            auto_status_ms: 5000,
            connect_timeout_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Reads and parses the config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
        let path = path.as_ref();
        let json_content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&json_content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`EngineConfig::load`], but a missing file simply means defaults. A broken file is still an error.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
        match EngineConfig::load(path).await {
            Err(ConfigError::Read { path, source })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::info!(?path, "No config file found, using defaults.");
                Ok(EngineConfig::default())
            }
            other => other,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
