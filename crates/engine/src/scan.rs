use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use std::sync::Arc;

use crate::{
    aggregator::{BucketAggregator, BucketAnalysis},
    classifier::ObjectClassifier,
    config::Thresholds,
    error::{ConfigError, ConfigResult},
    multipart::{MultipartAnalysis, MultipartUploadRecord, MultipartWasteEstimator, PartBytes},
    pricing::PricingTable,
    summary::{FleetSummarizer, FleetSummary},
    traits::InventorySource,
};

/// Results of one scan, in the order the buckets were requested.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub scanned_at: DateTime<Utc>,
    pub bucket_analyses: Vec<BucketAnalysis>,
    pub multipart_analyses: Vec<MultipartAnalysis>,
}

impl ScanOutcome {
    pub fn summarize(&self, pricing: &PricingTable) -> FleetSummary {
        FleetSummarizer::summarize(&self.bucket_analyses, &self.multipart_analyses, pricing)
    }
}

/// Drives an [`InventorySource`] through the classifier and aggregators.
///
/// Buckets are scanned concurrently up to `concurrency`; each bucket's
/// aggregator lives inside exactly one future.
pub struct Scanner<S> {
    source: S,
    classifier: ObjectClassifier,
    estimator: MultipartWasteEstimator,
    pricing: Arc<PricingTable>,
    concurrency: usize,
}

impl<S: InventorySource> Scanner<S> {
    pub fn new(
        source: S,
        thresholds: Thresholds,
        pricing: Arc<PricingTable>,
        concurrency: usize,
    ) -> ConfigResult<Self> {
        if concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "scan_concurrency",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            source,
            classifier: ObjectClassifier::new(thresholds, pricing.clone())?,
            estimator: MultipartWasteEstimator::new(&thresholds)?,
            pricing,
            concurrency,
        })
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn thresholds(&self) -> &Thresholds {
        self.classifier.thresholds()
    }

    pub async fn discover_buckets(&self) -> Result<Vec<String>> {
        self.source.list_buckets().await
    }

    /// Classify and fold every object of one bucket. Listing failures,
    /// including ones midway through the stream, yield an errored analysis.
    pub async fn analyze_bucket(&self, bucket: &str, now: DateTime<Utc>) -> BucketAnalysis {
        tracing::info!("Analyzing bucket: {}", bucket);
        let mut aggregator = BucketAggregator::new(bucket);

        let mut objects = match self.source.list_objects(bucket).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!("Error accessing bucket {}: {:#}", bucket, e);
                return aggregator.fail(format!("{:#}", e));
            }
        };

        while let Some(item) = objects.next().await {
            match item {
                Ok(object) => {
                    let classification = self.classifier.classify(&object, now);
                    aggregator.add(&object, classification);
                }
                Err(e) => {
                    tracing::warn!(
                        "Listing of bucket {} failed after {} objects: {:#}",
                        bucket,
                        aggregator.object_count(),
                        e
                    );
                    return aggregator.fail(format!("{:#}", e));
                }
            }
        }

        let analysis = aggregator.finalize();
        tracing::info!(
            "Finished bucket {}: {} objects, {} IA candidates, {} Glacier candidates, {} stale",
            analysis.bucket_name,
            analysis.total_objects,
            analysis.candidates_for_ia.len(),
            analysis.candidates_for_glacier.len(),
            analysis.stale_objects.len()
        );
        analysis
    }

    /// Find stale incomplete uploads in one bucket. Part sizes are only
    /// fetched for stale uploads; a failed fetch keeps the upload with an
    /// unknown size.
    pub async fn analyze_multipart_uploads(
        &self,
        bucket: &str,
        now: DateTime<Utc>,
    ) -> MultipartAnalysis {
        tracing::info!("Analyzing multipart uploads for bucket: {}", bucket);

        let mut uploads = match self.source.list_multipart_uploads(bucket).await {
            Ok(uploads) => uploads,
            Err(e) => {
                tracing::warn!("Error analyzing multipart uploads for {}: {:#}", bucket, e);
                return MultipartAnalysis::failed(bucket, format!("{:#}", e));
            }
        };

        let mut analysis = MultipartAnalysis::new(bucket);
        while let Some(item) = uploads.next().await {
            let upload = match item {
                Ok(upload) => upload,
                Err(e) => {
                    tracing::warn!("Multipart listing for {} failed: {:#}", bucket, e);
                    return MultipartAnalysis::failed(bucket, format!("{:#}", e));
                }
            };

            if !self.estimator.is_stale(upload.initiated, now) {
                analysis.record(None);
                continue;
            }

            let part_bytes = match self
                .source
                .part_bytes(bucket, &upload.key, &upload.upload_id)
                .await
            {
                Ok(bytes) => PartBytes::Known(bytes),
                Err(e) => {
                    tracing::warn!(
                        "Could not size upload {} ({}) in {}: {:#}",
                        upload.upload_id,
                        upload.key,
                        bucket,
                        e
                    );
                    PartBytes::Unknown
                }
            };

            let record = MultipartUploadRecord::new(
                upload.key,
                upload.upload_id,
                upload.initiated,
                part_bytes,
                now,
            );
            analysis.record(self.estimator.evaluate(&record, now));
        }

        analysis
    }

    /// Scan every bucket in `buckets` as of `now`. Every requested bucket
    /// appears in the outcome, failed or not.
    pub async fn scan(&self, buckets: &[String], now: DateTime<Utc>) -> ScanOutcome {
        tracing::info!("Analyzing {} bucket(s)...", buckets.len());

        let results: Vec<(BucketAnalysis, MultipartAnalysis)> = stream::iter(buckets)
            .map(|bucket| async move {
                futures::join!(
                    self.analyze_bucket(bucket, now),
                    self.analyze_multipart_uploads(bucket, now)
                )
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let (bucket_analyses, multipart_analyses) = results.into_iter().unzip();
        ScanOutcome {
            scanned_at: now,
            bucket_analyses,
            multipart_analyses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ObjectStream, UploadStream};
    use anyhow::anyhow;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use tierbay_catalog::{MultipartUpload, StorageClass, StorageObject};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    /// In-memory source; `None` in a listing marks a failure at that point.
    #[derive(Default)]
    struct FakeSource {
        objects: HashMap<String, Vec<Option<StorageObject>>>,
        uploads: HashMap<String, Vec<(MultipartUpload, Option<u64>)>>,
    }

    impl FakeSource {
        fn with_objects(mut self, bucket: &str, objects: Vec<Option<StorageObject>>) -> Self {
            self.objects.insert(bucket.to_string(), objects);
            self
        }

        fn with_uploads(mut self, bucket: &str, uploads: Vec<(i64, Option<u64>)>) -> Self {
            let uploads = uploads
                .into_iter()
                .enumerate()
                .map(|(i, (age, size))| {
                    (
                        MultipartUpload {
                            id: Uuid::new_v4(),
                            key: format!("upload-{i}"),
                            upload_id: format!("{bucket}-{i}"),
                            initiated: now() - Duration::days(age),
                        },
                        size,
                    )
                })
                .collect();
            self.uploads.insert(bucket.to_string(), uploads);
            self
        }
    }

    impl InventorySource for FakeSource {
        async fn list_buckets(&self) -> Result<Vec<String>> {
            let mut names: Vec<_> = self.objects.keys().cloned().collect();
            names.sort();
            Ok(names)
        }

        async fn list_objects(&self, bucket: &str) -> Result<ObjectStream> {
            let listing = self
                .objects
                .get(bucket)
                .ok_or_else(|| anyhow!("AccessDenied"))?
                .clone();
            let items = listing
                .into_iter()
                .map(|item| item.ok_or_else(|| anyhow!("connection reset")));
            Ok(stream::iter(items).boxed())
        }

        async fn list_multipart_uploads(&self, bucket: &str) -> Result<UploadStream> {
            let uploads: Vec<_> = self
                .uploads
                .get(bucket)
                .map(|u| u.iter().map(|(upload, _)| Ok(upload.clone())).collect())
                .unwrap_or_default();
            Ok(stream::iter(uploads).boxed())
        }

        async fn part_bytes(&self, bucket: &str, _key: &str, upload_id: &str) -> Result<u64> {
            self.uploads
                .get(bucket)
                .and_then(|u| u.iter().find(|(upload, _)| upload.upload_id == upload_id))
                .and_then(|(_, size)| *size)
                .ok_or_else(|| anyhow!("ListParts denied"))
        }
    }

    fn object(key: &str, size: u64, age_days: i64) -> Option<StorageObject> {
        Some(StorageObject {
            key: key.to_string(),
            size,
            storage_class: StorageClass::Standard,
            last_modified: now() - Duration::days(age_days),
        })
    }

    fn scanner(source: FakeSource) -> Scanner<FakeSource> {
        Scanner::new(source, Thresholds::default(), Arc::new(PricingTable::default()), 2).unwrap()
    }

    #[tokio::test]
    async fn failing_bucket_does_not_affect_siblings() {
        let source = FakeSource::default()
            .with_objects("good", vec![object("logs/a.txt", 200 * 1024, 45), object("b", 1, 1)])
            .with_objects("flaky", vec![object("x", 1 << 30, 400), None, object("y", 1, 1)]);
        let scanner = scanner(source);

        let buckets = vec!["good".to_string(), "missing".to_string(), "flaky".to_string()];
        let outcome = scanner.scan(&buckets, now()).await;

        let names: Vec<_> = outcome
            .bucket_analyses
            .iter()
            .map(|a| a.bucket_name.as_str())
            .collect();
        assert_eq!(names, vec!["good", "missing", "flaky"]);

        let good = &outcome.bucket_analyses[0];
        assert!(good.error.is_none());
        assert_eq!(good.total_objects, 2);
        assert_eq!(good.candidates_for_ia.len(), 1);

        let missing = &outcome.bucket_analyses[1];
        assert_eq!(missing.error.as_deref(), Some("AccessDenied"));

        let flaky = &outcome.bucket_analyses[2];
        assert!(flaky.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(flaky.total_objects, 0);

        let summary = outcome.summarize(scanner.pricing());
        assert_eq!(summary.total_buckets, 3);
        assert_eq!(summary.total_objects, 2);
        assert_eq!(summary.total_size_bytes, good.total_size_bytes);
    }

    #[tokio::test]
    async fn stale_uploads_are_sized_or_flagged_unknown() {
        let source = FakeSource::default()
            .with_objects("b", vec![])
            .with_uploads("b", vec![(10, Some(1 << 30)), (3, Some(1 << 30)), (20, None)]);
        let scanner = scanner(source);

        let analysis = scanner.analyze_multipart_uploads("b", now()).await;
        assert_eq!(analysis.total_uploads, 3);
        assert_eq!(analysis.stale_uploads.len(), 2);
        assert_eq!(analysis.unknown_size_count(), 1);
        assert_eq!(analysis.known_size_gb(), 1.0);
        assert!(analysis.cost_is_lower_bound());
    }

    #[tokio::test]
    async fn rejects_zero_concurrency() {
        let result = Scanner::new(
            FakeSource::default(),
            Thresholds::default(),
            Arc::new(PricingTable::default()),
            0,
        );
        assert!(matches!(result, Err(ConfigError::InvalidSetting { .. })));
    }

    #[tokio::test]
    async fn discovers_buckets_from_source() {
        let source = FakeSource::default().with_objects("b", vec![]).with_objects("a", vec![]);
        assert_eq!(scanner(source).discover_buckets().await.unwrap(), vec!["a", "b"]);
    }
}
