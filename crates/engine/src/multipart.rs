//! Waste estimation for incomplete multipart uploads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tierbay_catalog::StorageClass;

use crate::{
    config::{age_in_days, older_than, Thresholds},
    error::ConfigResult,
    pricing::{bytes_to_gib, PricingTable},
};

/// Total bytes held by an upload's parts, if the parts listing succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartBytes {
    Known(u64),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadRecord {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
    pub part_bytes: PartBytes,
    pub age_days: i64,
}

impl MultipartUploadRecord {
    pub fn new(
        key: impl Into<String>,
        upload_id: impl Into<String>,
        initiated: DateTime<Utc>,
        part_bytes: PartBytes,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            upload_id: upload_id.into(),
            initiated,
            part_bytes,
            age_days: age_in_days(now.signed_duration_since(initiated)),
        }
    }
}

/// A stale upload still holding storage.
///
/// Unknown sizes are reported as `size_bytes: 0` with `size_known: false`,
/// which keeps them distinguishable from a genuinely empty upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WasteEntry {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
    pub age_days: i64,
    pub size_bytes: u64,
    pub size_gb: f64,
    pub size_known: bool,
}

#[derive(Debug, Clone)]
pub struct MultipartWasteEstimator {
    age_threshold_days: i64,
}

impl MultipartWasteEstimator {
    pub fn new(thresholds: &Thresholds) -> ConfigResult<Self> {
        thresholds.validate()?;
        Ok(Self {
            age_threshold_days: thresholds.multipart_age_days,
        })
    }

    /// Whether an upload started at `initiated` is old enough to count as waste.
    pub fn is_stale(&self, initiated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        older_than(now.signed_duration_since(initiated), self.age_threshold_days)
    }

    pub fn evaluate(
        &self,
        record: &MultipartUploadRecord,
        now: DateTime<Utc>,
    ) -> Option<WasteEntry> {
        if !self.is_stale(record.initiated, now) {
            return None;
        }

        let (size_bytes, size_known) = match record.part_bytes {
            PartBytes::Known(bytes) => (bytes, true),
            PartBytes::Unknown => (0, false),
        };

        Some(WasteEntry {
            key: record.key.clone(),
            upload_id: record.upload_id.clone(),
            initiated: record.initiated,
            age_days: age_in_days(now.signed_duration_since(record.initiated)),
            size_bytes,
            size_gb: bytes_to_gib(size_bytes),
            size_known,
        })
    }
}

/// Per-bucket multipart findings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultipartAnalysis {
    pub bucket_name: String,
    /// Every in-progress upload seen, stale or not.
    pub total_uploads: u64,
    pub stale_uploads: Vec<WasteEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MultipartAnalysis {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            total_uploads: 0,
            stale_uploads: Vec::new(),
            error: None,
        }
    }

    /// Upload listing failed. Discards anything gathered so far.
    pub fn failed(bucket_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(bucket_name)
        }
    }

    pub fn record(&mut self, entry: Option<WasteEntry>) {
        self.total_uploads += 1;
        if let Some(entry) = entry {
            self.stale_uploads.push(entry);
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn known_size_bytes(&self) -> u64 {
        self.stale_uploads
            .iter()
            .filter(|entry| entry.size_known)
            .map(|entry| entry.size_bytes)
            .sum()
    }

    pub fn known_size_gb(&self) -> f64 {
        bytes_to_gib(self.known_size_bytes())
    }

    pub fn unknown_size_count(&self) -> usize {
        self.stale_uploads.iter().filter(|entry| !entry.size_known).count()
    }

    /// Monthly STANDARD-rate cost of known-size waste. A lower bound when any
    /// size is unknown.
    pub fn estimated_monthly_cost(&self, pricing: &PricingTable) -> f64 {
        pricing.monthly_cost(&StorageClass::Standard, self.known_size_gb())
    }

    pub fn cost_is_lower_bound(&self) -> bool {
        self.unknown_size_count() > 0
    }
}
