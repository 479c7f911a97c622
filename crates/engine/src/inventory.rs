use anyhow::{anyhow, Result};
use futures::{stream, StreamExt, TryStreamExt};
use sqlx::SqlitePool;
use tierbay_catalog::{Bucket, BucketRepository, ObjectRepository, StorageObject, UploadRepository};
use uuid::Uuid;

use crate::traits::*;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// [`InventorySource`] backed by the SQLite inventory catalog.
#[derive(Debug, Clone)]
pub struct CatalogInventory {
    pool: SqlitePool,
    page_size: u32,
}

impl CatalogInventory {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Resolve a bucket that can be listed, or explain why it cannot.
    async fn listable_bucket(&self, name: &str) -> Result<Bucket> {
        let bucket = BucketRepository::new(self.pool.clone())
            .find_by_name(name)
            .await?
            .ok_or_else(|| anyhow!("Bucket not found in inventory: {}", name))?;

        if let Some(reason) = &bucket.listing_error {
            return Err(anyhow!("Error accessing bucket {}: {}", name, reason));
        }
        Ok(bucket)
    }
}

struct PageCursor {
    repo: ObjectRepository,
    bucket_id: Uuid,
    after: Option<String>,
    page_size: u32,
    exhausted: bool,
}

impl InventorySource for CatalogInventory {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let buckets = BucketRepository::new(self.pool.clone()).list().await?;
        Ok(buckets.into_iter().map(|bucket| bucket.name).collect())
    }

    async fn list_objects(&self, bucket: &str) -> Result<ObjectStream> {
        let bucket = self.listable_bucket(bucket).await?;
        let cursor = PageCursor {
            repo: ObjectRepository::new(self.pool.clone()),
            bucket_id: bucket.id,
            after: None,
            page_size: self.page_size,
            exhausted: false,
        };

        let pages = stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.exhausted {
                return Ok::<_, anyhow::Error>(None);
            }
            let page = cursor
                .repo
                .list_page(cursor.bucket_id, cursor.after.as_deref(), cursor.page_size)
                .await?;
            tracing::debug!("Fetched page of {} objects after {:?}", page.len(), cursor.after);

            cursor.exhausted = page.len() < cursor.page_size as usize;
            match page.last() {
                Some(last) => cursor.after = Some(last.key.clone()),
                None => return Ok(None),
            }
            Ok(Some((page, cursor)))
        });

        let objects = pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<StorageObject, anyhow::Error>)))
            .try_flatten();

        Ok(Box::pin(objects))
    }

    async fn list_multipart_uploads(&self, bucket: &str) -> Result<UploadStream> {
        let bucket = self.listable_bucket(bucket).await?;
        let uploads = UploadRepository::new(self.pool.clone())
            .list_by_bucket(bucket.id)
            .await?;

        Ok(stream::iter(uploads.into_iter().map(Ok)).boxed())
    }

    async fn part_bytes(&self, bucket: &str, _key: &str, upload_id: &str) -> Result<u64> {
        let bucket = self.listable_bucket(bucket).await?;
        UploadRepository::new(self.pool.clone())
            .part_bytes(bucket.id, upload_id)
            .await
    }
}
