//! Graph database handle
//!
//! Opens the SQLite file behind the knowledge graph (or a private
//! `:memory:` database), brings its schema up to date and reports row
//! counts for health checks.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

use super::migrations::{self, MigrationStatus};
use crate::error::Result;

/// Readers of the file database; writes are serialized by the graph store
const FILE_POOL_SIZE: u32 = 4;

/// Default database file in the platform data directory
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("supportgraph"))
        .unwrap_or_default()
        .join("supportgraph.db")
}

/// Schema version and row counts of an open graph database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub location: String,
    pub schema: MigrationStatus,
    pub entities: i64,
    pub relations: i64,
    pub feedback: i64,
}

/// Migrated connection pool for the knowledge graph tables
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect_with(options)
            .await?;

        Self::ready(pool, Some(path.to_path_buf())).await
    }

    /// Private database that lives as long as the handle
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::ready(pool, None).await
    }

    async fn ready(pool: SqlitePool, path: Option<PathBuf>) -> Result<Self> {
        let schema = migrations::run_migrations(&pool).await?;
        let db = Self { pool, path };
        info!(
            location = %db.location(),
            schema_version = schema.current_version,
            "Graph database opened"
        );
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// File path, or `:memory:`
    pub fn location(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string())
    }

    /// Query the schema version and table sizes
    pub async fn status(&self) -> Result<DatabaseStatus> {
        let schema = migrations::migration_status(&self.pool).await?;
        let (entities, relations, feedback): (i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM kg_entities),
                    (SELECT COUNT(*) FROM kg_relations),
                    (SELECT COUNT(*) FROM kg_feedback)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DatabaseStatus {
            location: self.location(),
            schema,
            entities,
            relations,
            feedback,
        })
    }
}
