use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod inventory;
pub mod multipart;
pub mod pricing;
pub mod scan;
pub mod summary;
pub mod traits;

pub use aggregator::*;
pub use classifier::*;
pub use config::*;
pub use error::*;
pub use inventory::*;
pub use multipart::*;
pub use pricing::*;
pub use scan::*;
pub use summary::*;
pub use traits::*;

fn default_scan_concurrency() -> usize {
    4
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Everything the analysis engine needs besides the inventory itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Per-tier USD/GB-month overrides keyed by storage class tag.
    #[serde(default)]
    pub pricing: BTreeMap<String, f64>,
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            pricing: BTreeMap::new(),
            scan_concurrency: default_scan_concurrency(),
            page_size: default_page_size(),
        }
    }
}

impl EngineConfig {
    pub fn pricing_table(&self) -> ConfigResult<PricingTable> {
        PricingTable::with_overrides(self.pricing.iter().map(|(tier, rate)| (tier, *rate)))
    }
}

/// Build a scanner over the SQLite inventory. Fails before any listing
/// happens if thresholds, prices or concurrency are invalid.
pub fn create_scanner(
    pool: SqlitePool,
    config: &EngineConfig,
) -> ConfigResult<Scanner<CatalogInventory>> {
    if config.page_size == 0 {
        return Err(ConfigError::InvalidSetting {
            name: "page_size",
            reason: "must be greater than zero".to_string(),
        });
    }

    let pricing = Arc::new(config.pricing_table()?);
    let source = CatalogInventory::new(pool).with_page_size(config.page_size);
    Scanner::new(source, config.thresholds, pricing, config.scan_concurrency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.scan_concurrency, 4);
        assert_eq!(config.page_size, 1000);
    }

    #[test]
    fn test_pricing_overrides_apply() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"pricing": {"GLACIER": 0.005}}"#).unwrap();
        let table = config.pricing_table().unwrap();
        assert_eq!(
            table.cost_per_gb_month(&tierbay_catalog::StorageClass::Glacier),
            0.005
        );
    }

    #[tokio::test]
    async fn test_create_scanner_rejects_bad_settings() {
        let catalog = tierbay_catalog::CatalogService::in_memory().await.unwrap();

        let mut config = EngineConfig::default();
        config.thresholds.glacier_age_days = -1;
        assert!(matches!(
            create_scanner(catalog.pool().clone(), &config),
            Err(ConfigError::NegativeAge { .. })
        ));

        let config = EngineConfig {
            page_size: 0,
            ..EngineConfig::default()
        };
        assert!(create_scanner(catalog.pool().clone(), &config).is_err());

        let config = EngineConfig {
            pricing: BTreeMap::from([("STANDARD".to_string(), -1.0)]),
            ..EngineConfig::default()
        };
        assert!(matches!(
            create_scanner(catalog.pool().clone(), &config),
            Err(ConfigError::InvalidPrice { .. })
        ));

        assert!(create_scanner(catalog.pool().clone(), &EngineConfig::default()).is_ok());
    }
}
