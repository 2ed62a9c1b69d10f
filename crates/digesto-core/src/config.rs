//! Pipeline configuration.
//!
//! Every field has a default matching the production deployment; a JSON file
//! can override any subset of them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DOCUMENT_BASE_URL: &str =
    "https://servicios.infoleg.gob.ar/infolegInternet/verNorma.do?id=";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Prefix the norm id is appended to for a live fetch.
    pub document_base_url: String,
    /// Store folder holding raw fiche HTML, one `<id>.html` per norm.
    pub raw_folder: String,
    /// Store folder holding parsed fiche JSON, one `<id>.json` per norm.
    pub parsed_folder: String,
    /// Store folder receiving the consolidated tables.
    pub output_folder: String,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_base_url: DEFAULT_DOCUMENT_BASE_URL.to_string(),
            raw_folder: "/fichas_html".to_string(),
            parsed_folder: "/fichas_json".to_string(),
            output_folder: "/data_procesada".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON config, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.raw_folder == self.parsed_folder {
            return Err(ConfigError::Invalid(
                "raw_folder and parsed_folder must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Fixed-count, fixed-delay retry policy for live fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1500,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// A policy with no delay between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay(), Duration::from_millis(1500));
        assert!(config.document_base_url.ends_with("?id="));
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(r#"{"retry": {"delay_ms": 10}}"#).unwrap();
        assert_eq!(config.retry.delay_ms, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.parsed_folder, "/fichas_json");
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = PipelineConfig::from_json(r#"{"retry": {"max_attempts": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_shared_cache_folder() {
        let err =
            PipelineConfig::from_json(r#"{"raw_folder": "/x", "parsed_folder": "/x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
