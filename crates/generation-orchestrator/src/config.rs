//! Orchestrator configuration
//!
//! Loaded from a JSON file when present, otherwise defaults apply. Missing
//! fields in the file also fall back to their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{channels, reconnect};
use crate::error::{GenerationError, Result};

/// Configuration for a generation driver and its progress listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Fixed delay between reconnect attempts
    pub reconnect_backoff_ms: u64,
    /// Reconnect attempts before the session is failed
    pub max_reconnect_attempts: u32,
    /// Bounded capacity of each progress subscriber channel
    pub listener_buffer: usize,
    /// Wait for room in a full subscriber channel before giving up on it
    pub emit_timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: reconnect::BACKOFF_MS,
            max_reconnect_attempts: reconnect::MAX_ATTEMPTS,
            listener_buffer: channels::LISTENER_BUFFER,
            emit_timeout_ms: channels::EMIT_TIMEOUT_MS,
        }
    }
}

impl GenerationConfig {
    /// Load configuration from a JSON file, defaulting when it does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            log::debug!("No generation config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).await?;
        log::info!("Generation config saved to {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.listener_buffer == 0 {
            return Err(GenerationError::Config(
                "listenerBuffer must be at least 1".to_string(),
            ));
        }
        if self.emit_timeout_ms == 0 {
            return Err(GenerationError::Config(
                "emitTimeoutMs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.emit_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
