use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub mod import;
pub mod migrations;
pub mod models;
pub mod repository;

pub use import::*;
pub use models::*;
pub use repository::*;

#[derive(Debug, Clone)]
pub struct CatalogService {
    pool: SqlitePool,
}

impl CatalogService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Open the catalog, creating the database file and schema if needed.
    pub async fn open(database_url: &str) -> Result<Self> {
        migrations::ensure_database_exists(database_url).await?;
        let catalog = Self::new(database_url).await?;
        migrations::run_migrations(catalog.pool()).await?;
        Ok(catalog)
    }

    /// A migrated catalog living in a single in-memory connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
