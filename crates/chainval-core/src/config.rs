//! Validator configuration
//!
//! Loaded once at startup (usually from YAML) and shared read-only by every
//! validation call.
use crate::error::{ChainvalError, Result};
use crate::severity::Severity;
use crate::value::ApiVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do when one chain carries the same extension twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Companion lookups use the first occurrence, duplicates are ignored
    FirstMatch,
    /// Companion lookups use the first occurrence, each duplicate is reported
    Reject,
}

/// Output style for rendered messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStyle {
    /// Highlight spans are stripped
    Plain,
    /// Highlight spans become ANSI bold
    Ansi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Upper bound on nodes visited per chain
    pub max_chain_length: usize,
    pub duplicate_policy: DuplicatePolicy,
    /// API version the caller targets; newer extensions are reported
    pub api_version: ApiVersion,
    /// Lowest severity the default reporter treats as fatal
    pub abort_at: Severity,
    pub render_style: RenderStyle,
    /// Append the annotated rule expression to rendered messages
    pub annotate_expressions: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_chain_length: 1024,
            duplicate_policy: DuplicatePolicy::Reject,
            api_version: ApiVersion::default(),
            abort_at: Severity::Error,
            render_style: RenderStyle::Plain,
            annotate_expressions: true,
        }
    }
}

impl ValidatorConfig {
    /// Parse configuration from YAML; omitted keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ValidatorConfig =
            serde_yaml::from_str(yaml).map_err(|e| ChainvalError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loading validator config");
        Self::from_yaml(&content)
    }

    /// Reject settings no validator can run with
    pub fn check(&self) -> Result<()> {
        if self.max_chain_length == 0 {
            return Err(ChainvalError::Config(
                "max_chain_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
