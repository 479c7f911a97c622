//! Static storage pricing, in USD per GB-month.
//!
//! "GB" here is a binary gibibyte: every size fed into the table goes through
//! [`bytes_to_gib`], so the table and the conversions share one convention.

use serde::Serialize;
use std::collections::BTreeMap;
use tierbay_catalog::StorageClass;

use crate::error::{ConfigError, ConfigResult};

pub const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const STANDARD_RATE: f64 = 0.023;

pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

/// Immutable rate table. Build once at start-up and share behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PricingTable {
    rates: BTreeMap<StorageClass, f64>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let rates = [
            (StorageClass::Standard, STANDARD_RATE),
            (StorageClass::IntelligentTiering, 0.023),
            (StorageClass::StandardIa, 0.0125),
            (StorageClass::OnezoneIa, 0.01),
            (StorageClass::GlacierIr, 0.004),
            (StorageClass::Glacier, 0.0036),
            (StorageClass::DeepArchive, 0.00099),
        ]
        .into_iter()
        .collect();

        Self { rates }
    }
}

impl PricingTable {
    /// The default table with individual rates replaced or added.
    ///
    /// Tier names are parsed like storage class tags, so unknown names price
    /// custom tiers instead of being rejected.
    pub fn with_overrides<I, K>(overrides: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut table = Self::default();
        for (tier, rate) in overrides {
            let tier = tier.as_ref();
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::InvalidPrice {
                    tier: tier.to_string(),
                    value: rate,
                });
            }
            table.rates.insert(StorageClass::parse(tier), rate);
        }
        Ok(table)
    }

    /// Unit cost for a tier. Tiers without a rate are priced as STANDARD.
    pub fn cost_per_gb_month(&self, class: &StorageClass) -> f64 {
        self.rates
            .get(class)
            .or_else(|| self.rates.get(&StorageClass::Standard))
            .copied()
            .unwrap_or(STANDARD_RATE)
    }

    pub fn monthly_cost(&self, class: &StorageClass, size_gb: f64) -> f64 {
        size_gb * self.cost_per_gb_month(class)
    }

    /// Per-GB monthly saving of moving data from `from` to `to`. Negative when
    /// `to` is the more expensive tier.
    pub fn savings_per_gb(&self, from: &StorageClass, to: &StorageClass) -> f64 {
        self.cost_per_gb_month(from) - self.cost_per_gb_month(to)
    }

    pub fn rates(&self) -> impl Iterator<Item = (&StorageClass, f64)> {
        self.rates.iter().map(|(class, rate)| (class, *rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tier_falls_back_to_standard() {
        let pricing = PricingTable::default();
        let odd = StorageClass::parse("REDUCED_REDUNDANCY");
        assert_eq!(pricing.cost_per_gb_month(&odd), 0.023);
    }

    #[test]
    fn overrides_replace_and_extend() {
        let pricing =
            PricingTable::with_overrides([("STANDARD", 0.021), ("OUTPOSTS", 0.05)]).unwrap();
        assert_eq!(pricing.cost_per_gb_month(&StorageClass::Standard), 0.021);
        assert_eq!(pricing.cost_per_gb_month(&StorageClass::parse("OUTPOSTS")), 0.05);
        assert_eq!(pricing.cost_per_gb_month(&StorageClass::Glacier), 0.0036);
        // unknown tiers follow the overridden STANDARD rate
        assert_eq!(pricing.cost_per_gb_month(&StorageClass::parse("SNOW")), 0.021);
    }

    #[test]
    fn invalid_rates_are_configuration_errors() {
        let err = PricingTable::with_overrides([("GLACIER", -0.1)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrice { ref tier, .. } if tier == "GLACIER"));
        assert!(PricingTable::with_overrides([("STANDARD", f64::NAN)]).is_err());
        assert!(PricingTable::with_overrides([("STANDARD", f64::INFINITY)]).is_err());
    }

    #[test]
    fn gib_conversion_is_binary() {
        assert_eq!(bytes_to_gib(1024 * 1024 * 1024), 1.0);
        assert!((bytes_to_gib(200 * 1024) - 0.000_190_734_863).abs() < 1e-12);
    }

    #[test]
    fn serializes_as_tag_keyed_map() {
        let json = serde_json::to_value(PricingTable::default()).unwrap();
        assert_eq!(json["STANDARD_IA"], 0.0125);
        assert_eq!(json["DEEP_ARCHIVE"], 0.00099);
    }
}
