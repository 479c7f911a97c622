use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tierbay_engine::{EngineConfig, Thresholds, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub database_url: String,
    pub log_level: String,
    pub scan_concurrency: usize,
    pub page_size: u32,
    pub thresholds: Thresholds,
    pub pricing: BTreeMap<String, f64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            database_url: "sqlite:./tierbay.db".to_string(),
            log_level: "info".to_string(),
            scan_concurrency: engine.scan_concurrency,
            page_size: DEFAULT_PAGE_SIZE,
            thresholds: engine.thresholds,
            pricing: engine.pricing,
        }
    }
}

impl AnalyzerConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            thresholds: self.thresholds,
            pricing: self.pricing.clone(),
            scan_concurrency: self.scan_concurrency,
            page_size: self.page_size,
        }
    }
}

/// Per-run threshold flags; each one set replaces the configured value.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ThresholdArgs {
    /// Age in days after which an object counts as stale
    #[arg(long, alias = "days-threshold")]
    pub stale_days: Option<i64>,

    /// Age in days after which STANDARD objects become IA candidates
    #[arg(long)]
    pub ia_days: Option<i64>,

    /// Minimum size in bytes for IA candidacy
    #[arg(long)]
    pub ia_min_size: Option<u64>,

    /// Age in days after which objects become Glacier candidates
    #[arg(long)]
    pub glacier_days: Option<i64>,

    /// Age in days after which an incomplete multipart upload counts as stale
    #[arg(long)]
    pub multipart_days: Option<i64>,
}

impl ThresholdArgs {
    pub fn apply(&self, thresholds: &mut Thresholds) {
        if let Some(days) = self.stale_days {
            thresholds.stale_age_days = days;
        }
        if let Some(days) = self.ia_days {
            thresholds.ia_age_days = days;
        }
        if let Some(bytes) = self.ia_min_size {
            thresholds.ia_min_size_bytes = bytes;
        }
        if let Some(days) = self.glacier_days {
            thresholds.glacier_age_days = days;
        }
        if let Some(days) = self.multipart_days {
            thresholds.multipart_age_days = days;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(AnalyzerConfig::from_toml("").unwrap(), AnalyzerConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = AnalyzerConfig::from_toml(
            r#"
            database_url = "sqlite:/var/lib/tierbay/inventory.db"
            scan_concurrency = 8

            [thresholds]
            glacier_age_days = 365

            [pricing]
            GLACIER = 0.004
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url, "sqlite:/var/lib/tierbay/inventory.db");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.thresholds.glacier_age_days, 365);
        assert_eq!(config.thresholds.stale_age_days, 90);

        let engine = config.engine_config();
        assert_eq!(engine.scan_concurrency, 8);
        assert_eq!(engine.page_size, 1000);
        assert_eq!(engine.pricing.get("GLACIER"), Some(&0.004));
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        assert!(AnalyzerConfig::from_toml("scan_concurrency = \"many\"").is_err());
    }

    #[test]
    fn test_threshold_flags_override_only_what_is_set() {
        let mut thresholds = Thresholds::default();
        let args = ThresholdArgs {
            stale_days: Some(30),
            multipart_days: Some(1),
            ..ThresholdArgs::default()
        };
        args.apply(&mut thresholds);

        assert_eq!(thresholds.stale_age_days, 30);
        assert_eq!(thresholds.multipart_age_days, 1);
        assert_eq!(thresholds.ia_age_days, 30);
        assert_eq!(thresholds.glacier_age_days, 180);
    }
}
