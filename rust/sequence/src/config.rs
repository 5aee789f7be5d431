//! Configuration for sequences.

use crate::context::{ContextMode, ParseContextModeError};
use serde::{Deserialize, Serialize};

/// Environment variable read by [`SequenceConfig::from_env`].
pub const CONTEXT_MODE_ENV: &str = "TELLTALE_SEQUENCE_CONTEXT";

/// Settings used when opening a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Name recorded on the sequence's tracing span.
    pub name: String,
    /// Context identity used by registries built from this config.
    pub mode: ContextMode,
    /// Whether dropping an unclosed sequence panics on unmet expectations.
    pub verify_on_drop: bool,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            name: "sequence".to_string(),
            mode: ContextMode::Thread,
            verify_on_drop: true,
        }
    }
}

impl SequenceConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sequence name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the context mode.
    pub fn with_mode(mut self, mode: ContextMode) -> Self {
        self.mode = mode;
        self
    }

    /// Panic on drop if the sequence was left incomplete.
    pub fn with_verify_on_drop(mut self) -> Self {
        self.verify_on_drop = true;
        self
    }

    /// Only release the context slot on drop; never panic.
    pub fn without_verify_on_drop(mut self) -> Self {
        self.verify_on_drop = false;
        self
    }

    /// Create configuration from the environment.
    ///
    /// Reads `TELLTALE_SEQUENCE_CONTEXT` (`thread` or `flow_aware`); an unset
    /// variable keeps the default mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable holds an unknown mode.
    pub fn from_env() -> Result<Self, ParseContextModeError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(CONTEXT_MODE_ENV) {
            config.mode = value.parse()?;
        }
        Ok(config)
    }

    /// Make this config's mode the process-wide context mode.
    ///
    /// Intended to be called once at process start, before any sequence is
    /// opened.
    pub fn install(&self) {
        crate::registry::set_context_mode(self.mode);
    }
}
