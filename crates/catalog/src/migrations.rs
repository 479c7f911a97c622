use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

pub async fn ensure_database_exists(database_url: &str) -> Result<()> {
    if database_url.contains(":memory:") {
        return Ok(());
    }
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
        tracing::info!("Database created: {}", database_url);
    }
    Ok(())
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Buckets known to the inventory, with the last listing failure if any
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS buckets (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE,
            listing_error TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            id TEXT PRIMARY KEY NOT NULL,
            bucket_id TEXT NOT NULL,
            key TEXT NOT NULL,
            size INTEGER NOT NULL,
            storage_class TEXT NOT NULL,
            last_modified TEXT NOT NULL,
            FOREIGN KEY (bucket_id) REFERENCES buckets (id) ON DELETE CASCADE,
            UNIQUE(bucket_id, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS multipart_uploads (
            id TEXT PRIMARY KEY NOT NULL,
            bucket_id TEXT NOT NULL,
            object_key TEXT NOT NULL,
            upload_id TEXT NOT NULL UNIQUE,
            initiated TEXT NOT NULL,
            parts_error TEXT,
            FOREIGN KEY (bucket_id) REFERENCES buckets (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS multipart_parts (
            id TEXT PRIMARY KEY NOT NULL,
            upload_id TEXT NOT NULL,
            part_number INTEGER NOT NULL,
            size INTEGER NOT NULL,
            FOREIGN KEY (upload_id) REFERENCES multipart_uploads (id) ON DELETE CASCADE,
            UNIQUE(upload_id, part_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_bucket_key ON objects (bucket_id, key)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_uploads_bucket ON multipart_uploads (bucket_id, initiated)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
