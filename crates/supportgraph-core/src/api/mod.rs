//! Request-level API
//!
//! `KnowledgeApi` is the explicit context value handed to every surface
//! (HTTP server, CLI). It owns the shared graph store and the engines built
//! on it; nothing here is global. Requests arrive as action-tagged JSON:
//!
//! ```json
//! { "action": "enrich-ticket", "data": { "ticketId": "T-1", "description": "..." } }
//! ```

pub mod diagnose;
pub mod enrich;
pub mod feedback;
pub mod health;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{CollaboratorKind, Config, LayoutConfig};
use crate::domain::knowledge::{
    AnalysisWindow, AnalyticsEngine, DiagnosisEngine, EntityType, ExtractionCollaborator,
    GraphAnalytics, GraphStore, HeuristicExtractionCollaborator, IngestionPipeline, Learner,
    LayoutState, LlmExtractionCollaborator, Maintenance, simulate,
};
use crate::error::{Error, Result};
use crate::infrastructure::knowledge::open_graph_store;
use crate::llm::LlmClient;
use crate::storage::Database;

pub use diagnose::{DiagnoseRequest, QuickSuggestionQuery};
pub use enrich::{EnrichRequest, EnrichResponse, SuggestEntitiesRequest};
pub use feedback::{ConfidenceOverride, FeedbackRequest, FeedbackResponse};
pub use health::{HealthCheck, HealthReport, HealthStatus};

/// Shared context for all request handlers
pub struct KnowledgeApi {
    store: Arc<GraphStore>,
    pipeline: IngestionPipeline,
    learner: Learner,
    diagnosis: DiagnosisEngine,
    analytics: AnalyticsEngine,
    maintenance: Maintenance,
    layout: LayoutConfig,
    database: Option<Database>,
}

impl KnowledgeApi {
    /// Wire engines around an existing store
    pub fn new(
        store: Arc<GraphStore>,
        collaborator: Arc<dyn ExtractionCollaborator>,
        config: &Config,
    ) -> Self {
        Self {
            pipeline: IngestionPipeline::new(store.clone(), collaborator, config.ingestion.clone()),
            learner: Learner::new(store.clone(), config.learner.clone())
                .with_anomaly_threshold(config.analytics.anomaly_threshold),
            diagnosis: DiagnosisEngine::new(store.clone(), config.diagnosis.clone()),
            analytics: AnalyticsEngine::new(store.clone(), config.analytics.clone()),
            maintenance: Maintenance::new(store.clone()),
            layout: config.layout.clone(),
            database: None,
            store,
        }
    }

    /// Attach the database behind the store so health checks can query it
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Open the configured store and collaborator
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (store, database) = open_graph_store(&config.storage).await?;
        let collaborator = build_collaborator(config)?;
        info!(collaborator = collaborator.name(), "Knowledge API ready");
        let api = Self::new(Arc::new(store), collaborator, config);
        Ok(match database {
            Some(db) => api.with_database(db),
            None => api,
        })
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn diagnosis(&self) -> &DiagnosisEngine {
        &self.diagnosis
    }

    pub fn maintenance(&self) -> &Maintenance {
        &self.maintenance
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.layout
    }

    pub async fn analytics(&self, window: Option<AnalysisWindow>) -> GraphAnalytics {
        self.analytics.analyze(window).await
    }

    /// Settled layout of the current graph, optionally restricted to some types
    pub async fn layout(&self, types: &[EntityType], ticks: Option<usize>) -> LayoutState {
        let snapshot = self.store.snapshot().await;
        let initial = LayoutState::from_graph(&snapshot, types, &self.layout);
        simulate(&initial, &self.layout, ticks.unwrap_or(self.layout.ticks))
    }
}

/// Pick the extraction collaborator named in the ingestion config
///
/// `auto` falls back to the heuristic extractor when no API key is set.
pub fn build_collaborator(config: &Config) -> Result<Arc<dyn ExtractionCollaborator>> {
    let api_key = config
        .llm
        .resolved_api_key()
        .map_err(|e| Error::ConfigError(e.to_string()))?;

    let llm = |key: String| -> Result<Arc<dyn ExtractionCollaborator>> {
        let client = LlmClient::new(config.llm.clone(), key)?;
        Ok(Arc::new(LlmExtractionCollaborator::new(
            client,
            config.ingestion.max_description_chars,
        )))
    };

    match (config.ingestion.collaborator, api_key) {
        (CollaboratorKind::Heuristic, _) => Ok(Arc::new(HeuristicExtractionCollaborator::new())),
        (CollaboratorKind::Llm | CollaboratorKind::Auto, Some(key)) => llm(key),
        (CollaboratorKind::Llm, None) => Err(Error::ConfigError(
            "ingestion.collaborator is 'llm' but no API key is set".into(),
        )),
        (CollaboratorKind::Auto, None) => {
            warn!("No LLM API key found; using heuristic extraction");
            Ok(Arc::new(HeuristicExtractionCollaborator::new()))
        }
    }
}
