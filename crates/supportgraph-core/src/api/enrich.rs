//! Enrichment requests: ticket ingestion and entity suggestions

use serde::{Deserialize, Serialize};

use super::KnowledgeApi;
use crate::domain::knowledge::{EnrichmentResult, EntitySuggestion, TicketInput};
use crate::error::Result;

const DEFAULT_SUGGESTION_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestEntitiesRequest {
    pub query: String,
    /// Optional free text; matches whose graph neighbours it names rank
    /// higher. Nothing is filtered out.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
pub enum EnrichRequest {
    EnrichTicket(TicketInput),
    SuggestEntities(SuggestEntitiesRequest),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EnrichResponse {
    Enriched(EnrichmentResult),
    Suggestions { suggestions: Vec<EntitySuggestion> },
}

impl KnowledgeApi {
    pub async fn enrich(&self, request: EnrichRequest) -> Result<EnrichResponse> {
        match request {
            EnrichRequest::EnrichTicket(ticket) => self
                .pipeline
                .enrich_ticket(&ticket)
                .await
                .map(EnrichResponse::Enriched),
            EnrichRequest::SuggestEntities(req) => {
                let suggestions = self
                    .pipeline
                    .suggest_entities(
                        &req.query,
                        req.context.as_deref(),
                        req.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT),
                    )
                    .await;
                Ok(EnrichResponse::Suggestions { suggestions })
            }
        }
    }
}
