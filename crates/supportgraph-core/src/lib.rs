//! Supportgraph Core Library
//!
//! A self-learning knowledge graph for IT-support tickets:
//! - Domain: graph store, ingestion, learner, diagnosis, analytics, layout
//! - Infrastructure: SQLite graph repository
//! - Storage: connection pool and schema migrations
//! - LLM integration for the extraction collaborator
//! - Request-level API shared by the HTTP server and the CLI

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod error_tests;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::KnowledgeApi;
    pub use crate::config::Config;
    pub use crate::domain::knowledge::{
        DiagnosisRequest, Entity, EntityType, FeedbackRecord, FeedbackTarget, GraphStore,
        Relation, RelationType, Sentiment, TicketInput, Urgency,
    };
    pub use crate::error::{Error, Result};
}
