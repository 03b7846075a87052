//! Error types for Supportgraph

use thiserror::Error;

/// Result type alias using Supportgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Supportgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Graph errors (E001-E099)
    #[error("Unknown entity '{entity_id}' referenced by relation '{relation_id}'. Relations may only link existing entities.")]
    UnknownEntity {
        relation_id: String,
        entity_id: String,
    },

    #[error("Type conflict for entity '{id}': stored as '{existing}', got '{requested}'. Use an explicit recategorization instead.")]
    TypeConflict {
        id: String,
        existing: String,
        requested: String,
    },

    #[error("Entity '{0}' not found.")]
    EntityNotFound(String),

    #[error("Relation '{0}' not found.")]
    RelationNotFound(String),

    // Extraction errors (E100-E199)
    #[error("Extraction response rejected: {0}")]
    ExtractionParseError(String),

    #[error("Extraction collaborator timed out after {0} seconds")]
    ExtractionTimeout(u64),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `supportgraph config get llm.api_key`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownEntity { .. } => "E001",
            Self::TypeConflict { .. } => "E002",
            Self::EntityNotFound(_) => "E003",
            Self::RelationNotFound(_) => "E004",
            Self::ExtractionParseError(_) => "E100",
            Self::ExtractionTimeout(_) => "E101",
            Self::NetworkError(_) => "E102",
            Self::LLMError(_) => "E103",
            Self::RateLimited(_) => "E104",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::TypeConflict { id, .. } => Some(format!("supportgraph recategorize {}", id)),
            Self::ExtractionParseError(_) | Self::ExtractionTimeout(_) => {
                Some("Retry the enrichment; the ticket was left unchanged".to_string())
            }
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("supportgraph config get llm.api_key".to_string()),
            Self::ConfigError(_) => Some("supportgraph config list".to_string()),
            _ => None,
        }
    }

    /// Whether the failure is worth a single retry of the extraction call
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ExtractionTimeout(_) | Self::RateLimited(_) => true,
            Self::NetworkError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::LLMError(msg) => msg.starts_with("Server error"),
            _ => false,
        }
    }
}
