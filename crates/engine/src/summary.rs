use serde::Serialize;
use tierbay_catalog::StorageClass;

use crate::{
    aggregator::BucketAnalysis,
    multipart::MultipartAnalysis,
    pricing::{bytes_to_gib, PricingTable},
};

/// Outcome for one bucket that was asked for, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStatus {
    pub bucket_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multipart_error: Option<String>,
}

/// Fleet-wide totals. Derived fresh from the per-bucket results on every
/// report; never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSummary {
    pub total_buckets: usize,
    pub failed_buckets: usize,
    pub buckets: Vec<BucketStatus>,
    pub total_objects: u64,
    pub total_size_bytes: u64,
    pub total_size_gb: f64,
    pub potential_ia_savings_monthly: f64,
    pub potential_glacier_savings_monthly: f64,
    pub stale_objects: u64,
    pub stale_size_gb: f64,
    pub multipart_stale_uploads: u64,
    pub multipart_unknown_size_uploads: u64,
    pub multipart_storage_bytes: u64,
    pub multipart_storage_gb: f64,
    pub multipart_monthly_cost: f64,
    /// Set when some stale uploads had unknown sizes, so the cost above
    /// undercounts.
    pub multipart_cost_is_lower_bound: bool,
}

pub struct FleetSummarizer;

impl FleetSummarizer {
    /// Reduce finalized bucket and multipart results into one summary.
    ///
    /// Errored entries contribute zero to every total but stay listed.
    pub fn summarize(
        buckets: &[BucketAnalysis],
        uploads: &[MultipartAnalysis],
        pricing: &PricingTable,
    ) -> FleetSummary {
        let mut statuses: Vec<BucketStatus> = buckets
            .iter()
            .map(|analysis| BucketStatus {
                bucket_name: analysis.bucket_name.clone(),
                error: analysis.error.clone(),
                multipart_error: None,
            })
            .collect();

        for upload in uploads {
            match statuses
                .iter_mut()
                .find(|status| status.bucket_name == upload.bucket_name)
            {
                Some(status) => status.multipart_error = upload.error.clone(),
                None => statuses.push(BucketStatus {
                    bucket_name: upload.bucket_name.clone(),
                    error: None,
                    multipart_error: upload.error.clone(),
                }),
            }
        }

        let healthy = || buckets.iter().filter(|analysis| !analysis.is_error());
        let total_size_bytes: u64 = healthy().map(|a| a.total_size_bytes).sum();
        let stale_size_bytes: u64 = healthy().map(|a| a.stale_size_bytes()).sum();

        let healthy_uploads = || uploads.iter().filter(|analysis| !analysis.is_error());
        let multipart_storage_bytes: u64 = healthy_uploads().map(|m| m.known_size_bytes()).sum();
        let multipart_storage_gb = bytes_to_gib(multipart_storage_bytes);
        let multipart_unknown_size_uploads: u64 =
            healthy_uploads().map(|m| m.unknown_size_count() as u64).sum();

        FleetSummary {
            total_buckets: statuses.len(),
            failed_buckets: statuses
                .iter()
                .filter(|s| s.error.is_some() || s.multipart_error.is_some())
                .count(),
            buckets: statuses,
            total_objects: healthy().map(|a| a.total_objects).sum(),
            total_size_bytes,
            total_size_gb: bytes_to_gib(total_size_bytes),
            potential_ia_savings_monthly: healthy().map(|a| a.ia_savings_monthly()).sum(),
            potential_glacier_savings_monthly: healthy().map(|a| a.glacier_savings_monthly()).sum(),
            stale_objects: healthy().map(|a| a.stale_objects.len() as u64).sum(),
            stale_size_gb: bytes_to_gib(stale_size_bytes),
            multipart_stale_uploads: healthy_uploads().map(|m| m.stale_uploads.len() as u64).sum(),
            multipart_unknown_size_uploads,
            multipart_storage_bytes,
            multipart_storage_gb,
            multipart_monthly_cost: pricing
                .monthly_cost(&StorageClass::Standard, multipart_storage_gb),
            multipart_cost_is_lower_bound: multipart_unknown_size_uploads > 0,
        }
    }
}
