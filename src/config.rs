//! Application configuration: engine and learning settings in one document.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::EngineConfig;
use crate::learning::LearningConfig;

/// Effective configuration. Every field may be omitted from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub learning: LearningConfig,
}

impl AppConfig {
    /// Load from a JSON file, or use defaults when no path is given.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                let config: AppConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?;
                debug!(path = %path.display(), "Loaded configuration");
                config
            }
            None => AppConfig::default(),
        };

        config.engine.validate().context("Invalid engine configuration")?;
        config.learning.validate().context("Invalid learning configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_without_file() {
        let config = tokio_test::block_on(AppConfig::load(None)).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradesage.json");
        std::fs::write(
            &path,
            r#"{"engine": {"scan_workers": 2, "fallback_atr_pct": "0.02"}, "learning": {"min_sample_size": 20}}"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.engine.scan_workers, 2);
        assert_eq!(config.engine.fallback_atr_pct, dec!(0.02));
        assert_eq!(config.learning.min_sample_size, 20);
        assert_eq!(config.learning.learning_rate, LearningConfig::default().learning_rate);
        assert_eq!(config.engine.thresholds, EngineConfig::default().thresholds);
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"learning": {"learning_rate": 1.5}}"#).unwrap();
        assert!(AppConfig::load(Some(&path)).await.is_err());
    }
}
