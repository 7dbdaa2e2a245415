use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

/// Tunables for one engine instance. Every key is optional in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period before a live field's pending write is sent.
    pub debounce_ms: u64,
    /// How long after a confirmed local write inbound pushes are ignored.
    pub suppression_window_ms: u64,
    pub undo_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            suppression_window_ms: 1800,
            undo_depth: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.undo_depth == 0 {
            return Err(EngineError::Config("undo_depth must be at least 1".into()));
        }
        Ok(())
    }
}
