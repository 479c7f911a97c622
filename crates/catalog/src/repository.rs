use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::*;

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn bucket_from_row(row: &SqliteRow) -> Result<Bucket> {
    Ok(Bucket {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        listing_error: row.get("listing_error"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

pub struct BucketRepository {
    pool: SqlitePool,
}

impl BucketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<Bucket> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO buckets (id, name, listing_error, created_at)
            VALUES (?, ?, NULL, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Bucket {
            id,
            name: name.to_string(),
            listing_error: None,
            created_at: now,
        })
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Bucket>> {
        let row = sqlx::query(
            "SELECT id, name, listing_error, created_at FROM buckets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| bucket_from_row(&row)).transpose()
    }

    pub async fn get_or_create(&self, name: &str) -> Result<Bucket> {
        match self.find_by_name(name).await? {
            Some(bucket) => Ok(bucket),
            None => self.create(name).await,
        }
    }

    pub async fn list(&self) -> Result<Vec<Bucket>> {
        let rows = sqlx::query(
            "SELECT id, name, listing_error, created_at FROM buckets ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(bucket_from_row).collect()
    }

    /// Record (or clear, with `None`) a listing failure for a bucket.
    pub async fn set_listing_error(&self, name: &str, error: Option<&str>) -> Result<bool> {
        let result = sqlx::query("UPDATE buckets SET listing_error = ? WHERE name = ?")
            .bind(error)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct ObjectRepository {
    pool: SqlitePool,
}

impl ObjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an object, replacing any earlier snapshot of the same key.
    pub async fn upsert(&self, bucket_id: Uuid, object: &StorageObject) -> Result<()> {
        let size = i64::try_from(object.size)
            .with_context(|| format!("object {} is too large to store", object.key))?;

        sqlx::query(
            r#"
            INSERT INTO objects (id, bucket_id, key, size, storage_class, last_modified)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (bucket_id, key) DO UPDATE SET
                size = excluded.size,
                storage_class = excluded.storage_class,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(bucket_id.to_string())
        .bind(&object.key)
        .bind(size)
        .bind(object.storage_class.as_str())
        .bind(object.last_modified.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// One page of objects ordered by key, starting strictly after `after`.
    pub async fn list_page(
        &self,
        bucket_id: Uuid,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<StorageObject>> {
        let rows = sqlx::query(
            r#"
            SELECT key, size, storage_class, last_modified
            FROM objects
            WHERE bucket_id = ? AND key > ?
            ORDER BY key
            LIMIT ?
            "#,
        )
        .bind(bucket_id.to_string())
        .bind(after.unwrap_or(""))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            objects.push(StorageObject {
                key: row.get("key"),
                size: u64::try_from(row.get::<i64, _>("size"))?,
                storage_class: StorageClass::parse(&row.get::<String, _>("storage_class")),
                last_modified: parse_timestamp(&row.get::<String, _>("last_modified"))?,
            });
        }

        Ok(objects)
    }

    pub async fn count(&self, bucket_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM objects WHERE bucket_id = ?")
            .bind(bucket_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }
}

pub struct UploadRepository {
    pool: SqlitePool,
}

impl UploadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store an upload and its parts. Re-importing the same upload id replaces it.
    ///
    /// The record is validated up front and written in one transaction, so a
    /// rejected record never leaves a partially sized upload behind.
    pub async fn create(&self, bucket_id: Uuid, record: &UploadRecord) -> Result<MultipartUpload> {
        let mut seen = HashSet::with_capacity(record.parts.len());
        let mut parts = Vec::with_capacity(record.parts.len());
        for part in &record.parts {
            if !seen.insert(part.part_number) {
                return Err(anyhow!(
                    "Duplicate part number {} in upload {}",
                    part.part_number,
                    record.upload_id
                ));
            }
            let size = i64::try_from(part.size).with_context(|| {
                format!(
                    "Part {} of upload {} is too large: {} bytes",
                    part.part_number, record.upload_id, part.size
                )
            })?;
            parts.push((part.part_number, size));
        }

        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM multipart_uploads WHERE upload_id = ?")
            .bind(&record.upload_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO multipart_uploads
                (id, bucket_id, object_key, upload_id, initiated, parts_error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(bucket_id.to_string())
        .bind(&record.key)
        .bind(&record.upload_id)
        .bind(record.initiated.to_rfc3339())
        .bind(&record.parts_error)
        .execute(&mut *tx)
        .await?;

        for (part_number, size) in parts {
            sqlx::query(
                r#"
                INSERT INTO multipart_parts (id, upload_id, part_number, size)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(id.to_string())
            .bind(part_number)
            .bind(size)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(MultipartUpload {
            id,
            key: record.key.clone(),
            upload_id: record.upload_id.clone(),
            initiated: record.initiated,
        })
    }

    pub async fn list_by_bucket(&self, bucket_id: Uuid) -> Result<Vec<MultipartUpload>> {
        let rows = sqlx::query(
            r#"
            SELECT id, object_key, upload_id, initiated
            FROM multipart_uploads
            WHERE bucket_id = ?
            ORDER BY initiated, upload_id
            "#,
        )
        .bind(bucket_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut uploads = Vec::with_capacity(rows.len());
        for row in rows {
            uploads.push(MultipartUpload {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                key: row.get("object_key"),
                upload_id: row.get("upload_id"),
                initiated: parse_timestamp(&row.get::<String, _>("initiated"))?,
            });
        }

        Ok(uploads)
    }

    /// Sum of all part sizes for an upload.
    ///
    /// Fails when the upload is unknown or its parts listing was recorded as failed.
    pub async fn part_bytes(&self, bucket_id: Uuid, upload_id: &str) -> Result<u64> {
        let row = sqlx::query(
            "SELECT id, parts_error FROM multipart_uploads WHERE bucket_id = ? AND upload_id = ?",
        )
        .bind(bucket_id.to_string())
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("Multipart upload not found: {}", upload_id))?;

        if let Some(reason) = row.get::<Option<String>, _>("parts_error") {
            return Err(anyhow!("Unable to list parts for {}: {}", upload_id, reason));
        }

        let total = sqlx::query(
            "SELECT COALESCE(SUM(size), 0) AS total FROM multipart_parts WHERE upload_id = ?",
        )
        .bind(row.get::<String, _>("id"))
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(total.get::<i64, _>("total"))?)
    }
}
