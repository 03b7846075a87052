//! Knowledge graph domain module
//!
//! A confidence-scored graph of IT-support knowledge (equipment, errors,
//! symptoms, solutions, brands, procedures) and the engines that feed and
//! read it:
//!
//! - **Ingestion**: ticket text → extraction collaborator → graph mutations
//! - **Learner**: feedback and resolution outcomes → confidence changes
//! - **Diagnosis**: symptoms → ranked causes, solutions and risk
//! - **Analytics**: distributions, influence, anomalies, growth, insights
//! - **Layout**: force-directed positions for visualization
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  TicketInput → IngestionPipeline → GraphStore::transact        │
//! │  FeedbackRecord / ResolutionTrace → Learner → transact         │
//! └────────────────────────────────────────────────────────────────┘
//!                               ↓ GraphRepository (memory | SQLite)
//! ┌────────────────────────────────────────────────────────────────┐
//! │  GraphStore::snapshot → Diagnosis | Analytics | Layout         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use supportgraph_core::domain::knowledge::*;
//!
//! let store = Arc::new(GraphStore::in_memory());
//! let pipeline = IngestionPipeline::new(
//!     store.clone(),
//!     Arc::new(HeuristicExtractionCollaborator::new()),
//!     IngestionConfig::default(),
//! );
//! pipeline
//!     .enrich_ticket(&TicketInput::new("T-1", "Écran bleu au démarrage, Dell Latitude"))
//!     .await?;
//!
//! let engine = DiagnosisEngine::new(store, DiagnosisConfig::default());
//! let result = engine.diagnose(&DiagnosisRequest::new(["écran bleu"])).await?;
//! ```

mod analytics;
mod confidence;
mod diagnosis;
mod entity;
mod event;
mod extractor;
mod feedback;
mod graph;
mod id;
mod ingestion;
mod insight;
mod layout;
mod learner;
mod maintenance;
mod relation;
mod repository;
mod store;
mod ticket;

pub use analytics::{
    AnalysisWindow, AnalyticsEngine, Anomaly, ConfidenceMetrics, GraphAnalytics, GrowthMetrics,
    InfluenceEntry, analyze, confidence_metrics, detect_anomalies, growth_metrics,
    influence_ranking,
};
pub use confidence::{
    BoundedConfidence, ConfidenceChange, MAX_CONFIDENCE, MIN_CONFIDENCE, bound_confidence,
};
pub use diagnosis::{
    CaseRecord, DiagnosisContext, DiagnosisEngine, DiagnosisRequest, DiagnosisResult,
    PossibleCause, RecommendedSolution, RelatedCase, RiskAssessment, diagnose, match_strength,
    quick_suggestions, rank_causes,
};
pub use entity::{
    Entity, EntityType, MAX_TRAIL_ENTRIES, MERGE_COUNT_KEY, PROVENANCE_KEY, Properties, SOURCE_KEY,
};
pub use event::{KnowledgeEvent, TargetKind};
pub use extractor::{
    CONTEXT_TYPES, Candidate, ContextCandidate, EquipmentCandidate, ErrorCandidate, ExtractionCollaborator,
    ExtractionPayload, HeuristicExtractionCollaborator, LlmExtractionCollaborator,
    SolutionCandidate, ValidatedExtraction, parse_extraction_payload,
};
pub use feedback::{FeedbackRecord, FeedbackTarget, Sentiment};
pub use graph::{GraphState, GraphStats, Neighbor, TraversalDirection};
pub use id::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
pub use ingestion::{
    EnrichmentResult, EntitySuggestion, IngestionPipeline, MatchField, suggest_entities,
};
pub use insight::{Insight, InsightType, Severity};
pub use layout::{
    LayoutCommand, LayoutEdge, LayoutNode, LayoutRunner, LayoutState, render_svg, simulate, step,
};
pub use learner::{
    REINFORCEMENTS_KEY, ConfidenceTarget, FeedbackOutcome, LearnedEntity, Learner, Learning, LearningKind,
    Reinforcement, ResolutionOutcome, ResolutionTrace, UpdateResult, UpdateStatus,
};
pub use maintenance::{Maintenance, PruneCriteria, PruneReport, PrunedEntity, plan_prune};
pub use relation::{Relation, RelationType, SUCCESS_RATE_KEY, SUCCESS_SAMPLES_KEY};
pub use repository::{ChangeSet, GraphRepository, InMemoryGraphRepository};
pub use store::{DEFAULT_EVENT_CAPACITY, GraphStore, GraphTransaction};
pub use ticket::{TicketInput, Urgency};
