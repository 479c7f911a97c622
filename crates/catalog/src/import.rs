//! Loading JSON-lines inventory snapshots into the catalog.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use uuid::Uuid;

use crate::{
    models::*,
    repository::{BucketRepository, ObjectRepository, UploadRepository},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub buckets: usize,
    pub records: usize,
    pub skipped_lines: usize,
}

pub struct InventoryImporter {
    buckets: BucketRepository,
    objects: ObjectRepository,
    uploads: UploadRepository,
    bucket_ids: HashMap<String, Uuid>,
}

impl InventoryImporter {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            buckets: BucketRepository::new(pool.clone()),
            objects: ObjectRepository::new(pool.clone()),
            uploads: UploadRepository::new(pool),
            bucket_ids: HashMap::new(),
        }
    }

    async fn bucket_id(&mut self, name: &str) -> Result<Uuid> {
        if let Some(id) = self.bucket_ids.get(name) {
            return Ok(*id);
        }
        let bucket = self.buckets.get_or_create(name).await?;
        self.bucket_ids.insert(name.to_string(), bucket.id);
        Ok(bucket.id)
    }

    /// Import one `ObjectRecord` per line. Blank lines are skipped.
    pub async fn import_objects<R>(&mut self, reader: R) -> Result<ImportStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = ImportStats::default();
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let known_before = self.bucket_ids.len();

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                stats.skipped_lines += 1;
                continue;
            }

            let record: ObjectRecord = serde_json::from_str(&line)
                .with_context(|| format!("invalid object record on line {}", line_no))?;
            let bucket_id = self.bucket_id(&record.bucket).await?;
            let object = StorageObject {
                key: record.key,
                size: record.size,
                storage_class: StorageClass::parse(record.storage_class.as_deref().unwrap_or("")),
                last_modified: record.last_modified,
            };
            self.objects.upsert(bucket_id, &object).await?;
            stats.records += 1;
        }

        stats.buckets = self.bucket_ids.len() - known_before;
        tracing::info!(
            "Imported {} objects ({} new buckets, {} blank lines)",
            stats.records,
            stats.buckets,
            stats.skipped_lines
        );
        Ok(stats)
    }

    /// Import one `UploadRecord` per line. Blank lines are skipped.
    pub async fn import_uploads<R>(&mut self, reader: R) -> Result<ImportStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = ImportStats::default();
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let known_before = self.bucket_ids.len();

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                stats.skipped_lines += 1;
                continue;
            }

            let record: UploadRecord = serde_json::from_str(&line)
                .with_context(|| format!("invalid upload record on line {}", line_no))?;
            let bucket_id = self.bucket_id(&record.bucket).await?;
            self.uploads
                .create(bucket_id, &record)
                .await
                .with_context(|| format!("rejected upload record on line {}", line_no))?;
            stats.records += 1;
        }

        stats.buckets = self.bucket_ids.len() - known_before;
        tracing::info!(
            "Imported {} multipart uploads ({} new buckets)",
            stats.records,
            stats.buckets
        );
        Ok(stats)
    }
}
