//! Database migrations
//!
//! Versioned SQLite schema for the knowledge graph, applied automatically
//! when a database is opened.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::Result;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Entities, relations and feedback
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS kg_entities (
        id TEXT PRIMARY KEY NOT NULL,
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        canonical_name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        properties TEXT NOT NULL DEFAULT '{}',
        confidence REAL NOT NULL CHECK (confidence >= 0.1 AND confidence <= 1.0),
        ticket_ids TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_kg_entities_type_canonical
        ON kg_entities(entity_type, canonical_name);
    CREATE INDEX IF NOT EXISTS idx_kg_entities_updated_at ON kg_entities(updated_at);

    CREATE TABLE IF NOT EXISTS kg_relations (
        id TEXT PRIMARY KEY NOT NULL,
        source_id TEXT NOT NULL REFERENCES kg_entities(id) ON DELETE CASCADE,
        target_id TEXT NOT NULL REFERENCES kg_entities(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL,
        weight REAL NOT NULL DEFAULT 1.0,
        confidence REAL NOT NULL CHECK (confidence >= 0.1 AND confidence <= 1.0),
        properties TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_kg_relations_source ON kg_relations(source_id);
    CREATE INDEX IF NOT EXISTS idx_kg_relations_target ON kg_relations(target_id);
    CREATE INDEX IF NOT EXISTS idx_kg_relations_type ON kg_relations(relation_type);

    CREATE TABLE IF NOT EXISTS kg_feedback (
        id TEXT PRIMARY KEY NOT NULL,
        target_type TEXT NOT NULL CHECK (target_type IN ('entity', 'relation', 'diagnosis', 'solution')),
        target_id TEXT NOT NULL,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        sentiment TEXT NOT NULL DEFAULT 'neutral',
        comments TEXT NOT NULL DEFAULT '',
        context TEXT NOT NULL DEFAULT 'null',
        user_id TEXT,
        timestamp TEXT NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_kg_feedback_target ON kg_feedback(target_type, target_id);
"#;

/// Migration 2: Idempotency keys on feedback
const MIGRATION_V2: &str = r#"
    ALTER TABLE kg_feedback ADD COLUMN idempotency_key TEXT;

    CREATE UNIQUE INDEX IF NOT EXISTS idx_kg_feedback_idempotency
        ON kg_feedback(idempotency_key) WHERE idempotency_key IS NOT NULL;
"#;

/// Schema steps in application order: version, label, SQL
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (1, "knowledge graph tables", MIGRATION_V1),
    (2, "feedback idempotency keys", MIGRATION_V2),
];

/// Schema version of a graph database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}

async fn current_version(pool: &SqlitePool) -> Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;
    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every pending step, each in its own transaction
pub async fn run_migrations(pool: &SqlitePool) -> Result<MigrationStatus> {
    let from = current_version(pool).await?;

    for &(version, label, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > from) {
        info!(version, label, "Applying graph schema migration");
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    if from < CURRENT_VERSION {
        info!(from, to = CURRENT_VERSION, "Graph schema up to date");
    } else {
        debug!(version = from, "Graph schema already current");
    }
    migration_status(pool).await
}

pub async fn migration_status(pool: &SqlitePool) -> Result<MigrationStatus> {
    let current_version = current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}
