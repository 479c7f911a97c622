use anyhow::Result;
use futures::Stream;
use std::pin::Pin;
use tierbay_catalog::{MultipartUpload, StorageObject};

pub type ObjectStream = Pin<Box<dyn Stream<Item = Result<StorageObject>> + Send>>;

pub type UploadStream = Pin<Box<dyn Stream<Item = Result<MultipartUpload>> + Send>>;

/// The external lister the analyzer pulls from.
///
/// Object streams must be finite, restartable per bucket, and yield each key
/// at most once per pass. These are the only calls that may block.
pub trait InventorySource: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn list_objects(&self, bucket: &str) -> Result<ObjectStream>;

    async fn list_multipart_uploads(&self, bucket: &str) -> Result<UploadStream>;

    /// Total bytes held by an upload's parts.
    async fn part_bytes(&self, bucket: &str, key: &str, upload_id: &str) -> Result<u64>;
}
