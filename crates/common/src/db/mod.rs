//! Database layer for DocMind
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection pool management
//! - Schema bootstrap from the entity definitions

pub mod models;
mod repository;

pub use repository::{CollectionPatch, NewDocument, NewOutlineItem, Removed, Repository};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        if config.url.starts_with("sqlite") {
            // Every connection to an in-memory database is a separate database.
            opts.max_connections(1).min_connections(1);
        } else {
            opts.max_connections(config.max_connections)
                .min_connections(config.min_connections);
        }

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    /// Connect to a fresh in-memory SQLite database with the schema applied
    pub async fn in_memory() -> Result<Self> {
        let pool = Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await?;
        pool.ensure_schema().await?;
        Ok(pool)
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create any missing tables from the entity definitions.
    ///
    /// Parents are created before children so foreign keys resolve.
    pub async fn ensure_schema(&self) -> Result<()> {
        use models::*;

        self.create_table(CollectionEntity).await?;
        self.create_table(DocumentEntity).await?;
        self.create_table(OutlineItemEntity).await?;
        self.create_table(ChunkEntity).await?;
        self.create_table(RecommendationEntity).await?;
        self.create_table(InsightEntity).await?;
        self.create_table(PodcastEntity).await?;

        info!("Database schema ready");
        Ok(())
    }

    async fn create_table<E: EntityTrait>(&self, entity: E) -> Result<()> {
        let backend = self.conn.get_database_backend();
        let schema = Schema::new(backend);
        let mut stmt = schema.create_table_from_entity(entity);
        stmt.if_not_exists();
        self.conn.execute(backend.build(&stmt)).await?;
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_schema_is_idempotent() {
        let pool = DbPool::in_memory().await.unwrap();
        pool.ensure_schema().await.unwrap();
        pool.ping().await.unwrap();
    }
}
