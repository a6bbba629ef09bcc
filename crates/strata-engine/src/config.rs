//! Engine configuration.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sessions per chunk when none is configured, about two trading years.
pub const DEFAULT_CHUNK_SIZE: usize = 504;

/// Engine tuning knobs. None of them change results.
///
/// ```toml
/// chunk_size = 252
/// parallel = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Sessions computed per chunk by [`run_pipeline`](crate::PipelineEngine::run_pipeline).
    pub chunk_size: usize,

    /// Evaluate independent terms of one dependency level on the rayon pool.
    pub parallel: bool,

    /// Narrow the asset set up front when the screen reduces to a static
    /// asset list.
    pub prescreen: bool,

    /// Drop intermediate arrays once their last consumer has run.
    pub release_intermediates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
            prescreen: true,
            release_intermediates: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the chunk size.
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Enable or disable parallel evaluation.
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable or disable the prescreen.
    pub const fn with_prescreen(mut self, prescreen: bool) -> Self {
        self.prescreen = prescreen;
        self
    }
}
