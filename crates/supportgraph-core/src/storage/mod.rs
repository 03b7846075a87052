//! Storage layer - SQLite persistence for the knowledge graph
//!
//! # Architecture
//!
//! - `database`: Migrated connection pool and status report
//! - `migrations`: Versioned schema steps
//!
//! # Usage
//!
//! ```ignore
//! use supportgraph_core::storage::Database;
//!
//! // In-memory database for tests
//! let db = Database::in_memory().await?;
//!
//! // File-backed database
//! let db = Database::open("support.db").await?;
//! println!("{} entities", db.status().await?.entities);
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseStatus, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
