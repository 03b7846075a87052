//! Knowledge graph infrastructure implementations
//!
//! Concrete `GraphRepository` backends and the helper that opens a
//! `GraphStore` from configuration.

mod repository;

use std::sync::Arc;

use tracing::info;

pub use repository::SqliteGraphRepository;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::knowledge::{GraphStore, InMemoryGraphRepository, UuidIdGenerator};
use crate::error::Result;
use crate::storage::Database;

/// Open the graph store selected by the storage configuration
///
/// The SQLite backend also returns its database handle for status checks.
pub async fn open_graph_store(config: &StorageConfig) -> Result<(GraphStore, Option<Database>)> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory knowledge graph");
            let store =
                GraphStore::open(Arc::new(InMemoryGraphRepository::new()), Arc::new(UuidIdGenerator))
                    .await?;
            Ok((store, None))
        }
        StorageBackend::Sqlite => {
            let db = Database::open(config.resolved_database_path()).await?;
            info!(path = %db.location(), "Using SQLite knowledge graph");
            let store = GraphStore::open(
                Arc::new(SqliteGraphRepository::new(db.pool().clone())),
                Arc::new(UuidIdGenerator),
            )
            .await?;
            Ok((store, Some(db)))
        }
    }
}
