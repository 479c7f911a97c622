//! Per-bucket accumulation of classifier output.
//!
//! A [`BucketAggregator`] folds objects in one at a time and is consumed by
//! [`BucketAggregator::finalize`], which hands back an immutable
//! [`BucketAnalysis`]. Each aggregator must be owned by a single task; nothing
//! here deduplicates keys, so the lister must yield each key once per pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{btree_map::Entry, BTreeMap};
use std::fmt;
use tierbay_catalog::{StorageClass, StorageObject};

use crate::{
    classifier::{Classification, TierCandidate},
    pricing::bytes_to_gib,
};

/// Prefix used for keys without a path separator.
pub const ROOT_PREFIX: &str = "root";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Usage {
    pub count: u64,
    pub size_bytes: u64,
    pub size_gb: f64,
}

impl Usage {
    fn add(&mut self, size_bytes: u64) {
        self.count += 1;
        self.size_bytes += size_bytes;
        self.size_gb = bytes_to_gib(self.size_bytes);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupUpdate {
    Inserted,
    Updated,
}

/// Count and size keyed by a grouping (storage class, prefix).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Rollup<K: Ord> {
    entries: BTreeMap<K, Usage>,
}

impl<K: Ord> Default for Rollup<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord> Rollup<K> {
    /// Insert-or-update: starts a fresh entry for an unseen key, otherwise
    /// adds to the existing one.
    pub fn record(&mut self, key: K, size_bytes: u64) -> RollupUpdate {
        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Usage::default()).add(size_bytes);
                RollupUpdate::Inserted
            }
            Entry::Occupied(mut slot) => {
                slot.get_mut().add(size_bytes);
                RollupUpdate::Updated
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&Usage> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Usage)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.entries.values().map(|usage| usage.count).sum()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.entries.values().map(|usage| usage.size_bytes).sum()
    }

    /// Entries ordered by size, largest first.
    pub fn largest(&self, limit: usize) -> Vec<(&K, &Usage)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.1.size_bytes.cmp(&a.1.size_bytes));
        entries.truncate(limit);
        entries
    }
}

/// Everything before the last `/`; keys without one land in [`ROOT_PREFIX`].
pub fn prefix_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => ROOT_PREFIX,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleObject {
    pub key: String,
    pub size_bytes: u64,
    pub size_gb: f64,
    pub last_modified: DateTime<Utc>,
    pub storage_class: StorageClass,
    pub age_days: i64,
}

/// Accumulating state for one bucket.
#[derive(Debug)]
pub struct BucketAggregator {
    bucket_name: String,
    total: Usage,
    by_storage_class: Rollup<StorageClass>,
    by_prefix: Rollup<String>,
    findings: Vec<Classification>,
    stale_objects: Vec<StaleObject>,
}

impl BucketAggregator {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            total: Usage::default(),
            by_storage_class: Rollup::default(),
            by_prefix: Rollup::default(),
            findings: Vec::new(),
            stale_objects: Vec::new(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn object_count(&self) -> u64 {
        self.total.count
    }

    pub fn add(&mut self, object: &StorageObject, classification: Classification) {
        self.total.add(object.size);
        self.by_storage_class
            .record(object.storage_class.clone(), object.size);
        self.by_prefix
            .record(prefix_of(&object.key).to_string(), object.size);

        if classification.stale {
            self.stale_objects.push(StaleObject {
                key: object.key.clone(),
                size_bytes: object.size,
                size_gb: bytes_to_gib(object.size),
                last_modified: object.last_modified,
                storage_class: object.storage_class.clone(),
                age_days: classification.age_days,
            });
        }
        if classification.ia.is_some() || classification.glacier.is_some() {
            self.findings.push(classification);
        }
    }

    /// Close the bucket and partition findings into the IA and Glacier lists.
    /// An object may land in both.
    pub fn finalize(self) -> BucketAnalysis {
        let mut candidates_for_ia = Vec::new();
        let mut candidates_for_glacier = Vec::new();
        for finding in self.findings {
            candidates_for_ia.extend(finding.ia);
            candidates_for_glacier.extend(finding.glacier);
        }

        BucketAnalysis {
            bucket_name: self.bucket_name,
            total_objects: self.total.count,
            total_size_bytes: self.total.size_bytes,
            total_size_gb: self.total.size_gb,
            by_storage_class: self.by_storage_class,
            by_prefix: self.by_prefix,
            candidates_for_ia,
            candidates_for_glacier,
            stale_objects: self.stale_objects,
            error: None,
        }
    }

    /// Close the bucket as failed. Partial results are dropped and every
    /// total reads zero.
    pub fn fail(self, error: impl fmt::Display) -> BucketAnalysis {
        BucketAnalysis::failed(self.bucket_name, error.to_string())
    }
}

/// Finalized findings for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketAnalysis {
    pub bucket_name: String,
    pub total_objects: u64,
    pub total_size_bytes: u64,
    pub total_size_gb: f64,
    pub by_storage_class: Rollup<StorageClass>,
    pub by_prefix: Rollup<String>,
    pub candidates_for_ia: Vec<TierCandidate>,
    pub candidates_for_glacier: Vec<TierCandidate>,
    pub stale_objects: Vec<StaleObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BucketAnalysis {
    pub fn failed(bucket_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            total_objects: 0,
            total_size_bytes: 0,
            total_size_gb: 0.0,
            by_storage_class: Rollup::default(),
            by_prefix: Rollup::default(),
            candidates_for_ia: Vec::new(),
            candidates_for_glacier: Vec::new(),
            stale_objects: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn ia_savings_monthly(&self) -> f64 {
        self.candidates_for_ia
            .iter()
            .map(|c| c.potential_savings_monthly)
            .sum()
    }

    pub fn glacier_savings_monthly(&self) -> f64 {
        self.candidates_for_glacier
            .iter()
            .map(|c| c.potential_savings_monthly)
            .sum()
    }

    pub fn stale_size_bytes(&self) -> u64 {
        self.stale_objects.iter().map(|o| o.size_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classifier::ObjectClassifier, config::Thresholds, pricing::PricingTable};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn object(key: &str, size: u64, class: StorageClass, age_days: i64) -> StorageObject {
        StorageObject {
            key: key.to_string(),
            size,
            storage_class: class,
            last_modified: now() - Duration::days(age_days),
        }
    }

    fn fold(bucket: &str, objects: &[StorageObject]) -> BucketAnalysis {
        let pricing = Arc::new(PricingTable::default());
        let classifier = ObjectClassifier::new(Thresholds::default(), pricing).unwrap();
        let mut aggregator = BucketAggregator::new(bucket);
        for object in objects {
            aggregator.add(object, classifier.classify(object, now()));
        }
        aggregator.finalize()
    }

    #[test]
    fn rollup_distinguishes_insert_from_update() {
        let mut rollup = Rollup::default();
        assert_eq!(rollup.record("logs".to_string(), 100), RollupUpdate::Inserted);
        assert_eq!(rollup.get(&"logs".to_string()).unwrap().count, 1);

        assert_eq!(rollup.record("logs".to_string(), 50), RollupUpdate::Updated);
        let usage = rollup.get(&"logs".to_string()).unwrap();
        assert_eq!(usage.count, 2);
        assert_eq!(usage.size_bytes, 150);
        assert_eq!(usage.size_gb, bytes_to_gib(150));

        assert_eq!(rollup.record("img".to_string(), 1), RollupUpdate::Inserted);
        assert_eq!(rollup.len(), 2);
    }

    #[test]
    fn rollup_largest_orders_by_size() {
        let mut rollup = Rollup::default();
        rollup.record("a", 10);
        rollup.record("b", 30);
        rollup.record("c", 20);
        let keys: Vec<_> = rollup.largest(2).into_iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn prefix_is_everything_before_last_separator() {
        assert_eq!(prefix_of("logs/2024/01/a.txt"), "logs/2024/01");
        assert_eq!(prefix_of("logs/a.txt"), "logs");
        assert_eq!(prefix_of("a.txt"), ROOT_PREFIX);
        assert_eq!(prefix_of("/a.txt"), "");
        assert_eq!(prefix_of("/"), "");
        assert_eq!(prefix_of("dir/"), "dir");
    }

    #[test]
    fn partitions_reconcile_with_totals() {
        let analysis = fold(
            "mixed",
            &[
                object("logs/a", 1 << 20, StorageClass::Standard, 10),
                object("logs/b", 3 << 20, StorageClass::StandardIa, 100),
                object("img/c", 7 << 20, StorageClass::Glacier, 400),
                object("top", 11, StorageClass::parse("WEIRD"), 1),
            ],
        );

        assert_eq!(analysis.total_objects, 4);
        assert_eq!(analysis.by_storage_class.total_count(), 4);
        assert_eq!(analysis.by_prefix.total_count(), 4);
        assert_eq!(analysis.by_storage_class.total_size_bytes(), analysis.total_size_bytes);
        assert_eq!(analysis.by_prefix.total_size_bytes(), analysis.total_size_bytes);

        let tier_gb: f64 = analysis.by_storage_class.iter().map(|(_, u)| u.size_gb).sum();
        let prefix_gb: f64 = analysis.by_prefix.iter().map(|(_, u)| u.size_gb).sum();
        assert!((tier_gb - analysis.total_size_gb).abs() < 1e-12);
        assert!((prefix_gb - analysis.total_size_gb).abs() < 1e-12);
        assert!(analysis.by_prefix.get(&ROOT_PREFIX.to_string()).is_some());
    }

    #[test]
    fn finalize_partitions_candidates_and_allows_overlap() {
        let analysis = fold(
            "data",
            &[
                object("a", 1 << 30, StorageClass::Standard, 365),
                object("b", 1 << 30, StorageClass::Standard, 45),
                object("c", 1 << 30, StorageClass::StandardIa, 200),
                object("d", 1 << 30, StorageClass::Standard, 2),
            ],
        );

        let ia: Vec<_> = analysis.candidates_for_ia.iter().map(|c| c.key.as_str()).collect();
        let glacier: Vec<_> = analysis
            .candidates_for_glacier
            .iter()
            .map(|c| c.key.as_str())
            .collect();
        let stale: Vec<_> = analysis.stale_objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(ia, vec!["a", "b"]);
        assert_eq!(glacier, vec!["a", "c"]);
        assert_eq!(stale, vec!["a", "c"]);
        assert_eq!(analysis.stale_size_bytes(), 2 << 30);
        assert!(analysis.ia_savings_monthly() > 0.0);
        assert!(analysis.glacier_savings_monthly() > 0.0);
    }

    #[test]
    fn failed_bucket_reports_zero_totals() {
        let pricing = Arc::new(PricingTable::default());
        let classifier = ObjectClassifier::new(Thresholds::default(), pricing).unwrap();
        let mut aggregator = BucketAggregator::new("locked");
        let obj = object("x", 1 << 30, StorageClass::Standard, 500);
        aggregator.add(&obj, classifier.classify(&obj, now()));

        let analysis = aggregator.fail("AccessDenied");
        assert_eq!(analysis.bucket_name, "locked");
        assert_eq!(analysis.error.as_deref(), Some("AccessDenied"));
        assert_eq!(analysis.total_objects, 0);
        assert_eq!(analysis.total_size_gb, 0.0);
        assert!(analysis.candidates_for_glacier.is_empty());
        assert!(analysis.by_storage_class.is_empty());
    }

    #[test]
    fn serializes_rollups_as_maps() {
        let analysis = fold("s", &[object("logs/a", 2048, StorageClass::Standard, 1)]);
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["by_storage_class"]["STANDARD"]["count"], 1);
        assert_eq!(json["by_prefix"]["logs"]["size_bytes"], 2048);
        assert!(json.get("error").is_none());
    }
}
