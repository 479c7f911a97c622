use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tierbay_catalog::{StorageClass, StorageObject};

use crate::{
    config::{age_in_days, older_than, Thresholds},
    error::ConfigResult,
    pricing::{bytes_to_gib, PricingTable},
};

/// A recommended migration for one object. Never emitted for a no-op or
/// money-losing move; an equal-cost move yields zero savings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierCandidate {
    pub key: String,
    pub size_bytes: u64,
    pub size_gb: f64,
    pub age_days: i64,
    pub last_modified: DateTime<Utc>,
    pub current_storage_class: StorageClass,
    pub target_storage_class: StorageClass,
    pub potential_savings_monthly: f64,
}

impl TierCandidate {
    fn propose(
        object: &StorageObject,
        age_days: i64,
        target: StorageClass,
        pricing: &PricingTable,
    ) -> Option<Self> {
        if object.storage_class == target {
            return None;
        }
        let per_gb = pricing.savings_per_gb(&object.storage_class, &target);
        if per_gb < 0.0 {
            return None;
        }

        let size_gb = bytes_to_gib(object.size);
        Some(Self {
            key: object.key.clone(),
            size_bytes: object.size,
            size_gb,
            age_days,
            last_modified: object.last_modified,
            current_storage_class: object.storage_class.clone(),
            target_storage_class: target,
            potential_savings_monthly: size_gb * per_gb,
        })
    }
}

/// Outcome of classifying one object.
///
/// Staleness, IA candidacy and Glacier candidacy are independent facets; an
/// object may carry any combination of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub age_days: i64,
    pub stale: bool,
    pub ia: Option<TierCandidate>,
    pub glacier: Option<TierCandidate>,
}

impl Classification {
    pub fn is_no_action(&self) -> bool {
        !self.stale && self.ia.is_none() && self.glacier.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ObjectClassifier {
    thresholds: Thresholds,
    pricing: Arc<PricingTable>,
}

impl ObjectClassifier {
    pub fn new(thresholds: Thresholds, pricing: Arc<PricingTable>) -> ConfigResult<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds, pricing })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Evaluate every rule against `object` as of `now`. Pure.
    pub fn classify(&self, object: &StorageObject, now: DateTime<Utc>) -> Classification {
        let age = now.signed_duration_since(object.last_modified);
        let age_days = age_in_days(age);

        let stale = older_than(age, self.thresholds.stale_age_days);

        let ia = (object.storage_class == StorageClass::Standard
            && older_than(age, self.thresholds.ia_age_days)
            && object.size > self.thresholds.ia_min_size_bytes)
            .then(|| {
                TierCandidate::propose(object, age_days, StorageClass::StandardIa, &self.pricing)
            })
            .flatten();

        let glacier = (matches!(
            object.storage_class,
            StorageClass::Standard | StorageClass::StandardIa
        ) && older_than(age, self.thresholds.glacier_age_days))
        .then(|| TierCandidate::propose(object, age_days, StorageClass::Glacier, &self.pricing))
        .flatten();

        Classification {
            age_days,
            stale,
            ia,
            glacier,
        }
    }
}
