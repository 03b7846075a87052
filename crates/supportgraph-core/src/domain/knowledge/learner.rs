//! Feedback-driven confidence reinforcement
//!
//! The learner is the only component that moves confidence after creation,
//! apart from explicit manual overrides. Every adjustment goes through a
//! store transaction, so concurrent feedback on the same target is applied
//! one delta at a time and none is lost.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::confidence::ConfidenceChange;
use super::entity::{Entity, EntityType, SOURCE_KEY, push_property_entry};
use super::event::KnowledgeEvent;
use super::feedback::{FeedbackRecord, FeedbackTarget, Sentiment};
use super::insight::{Insight, InsightType, Severity};
use super::relation::{Relation, RelationType};
use super::store::{GraphStore, GraphTransaction};
use crate::config::LearnerConfig;
use crate::error::{Error, Result};

/// Property holding the log of reinforcements applied to an entity
pub const REINFORCEMENTS_KEY: &str = "reinforcements";

const DEFAULT_ANOMALY_THRESHOLD: f32 = 0.3;
/// Negative submissions on one target before a correlation insight is raised
const RECURRING_NEGATIVE_FEEDBACK: usize = 3;

/// Outcome class of a confidence update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Applied,
    /// The idempotency key was seen before; nothing was re-applied
    Duplicate,
    NotFound,
}

/// Result of applying feedback or an override to one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub success: bool,
    pub status: UpdateStatus,
    pub target_id: String,
    pub old_confidence: Option<f32>,
    pub new_confidence: Option<f32>,
    pub delta: f32,
    pub clamped: bool,
}

impl UpdateResult {
    fn applied(target_id: &str, change: ConfidenceChange) -> Self {
        Self {
            success: true,
            status: UpdateStatus::Applied,
            target_id: target_id.to_string(),
            old_confidence: Some(change.old_confidence),
            new_confidence: Some(change.new_confidence),
            delta: change.delta(),
            clamped: change.clamped,
        }
    }

    fn not_found(target_id: &str) -> Self {
        Self {
            success: false,
            status: UpdateStatus::NotFound,
            target_id: target_id.to_string(),
            old_confidence: None,
            new_confidence: None,
            delta: 0.0,
            clamped: false,
        }
    }

    fn duplicate(target_id: &str, current: Option<f32>) -> Self {
        Self {
            success: true,
            status: UpdateStatus::Duplicate,
            target_id: target_id.to_string(),
            old_confidence: current,
            new_confidence: current,
            delta: 0.0,
            clamped: false,
        }
    }
}

/// What a feedback submission produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub feedback_id: String,
    pub update_result: UpdateResult,
    pub insights: Vec<Insight>,
}

/// Target of a manual confidence override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ConfidenceTarget {
    Entity(String),
    Relation(String),
}

impl ConfidenceTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Entity(id) | Self::Relation(id) => id,
        }
    }
}

/// Entity learned from a resolved issue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub description: String,
    /// Initial confidence; the configured default when absent
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Existing entity the learned one should be linked to
    #[serde(default)]
    pub related_to: Option<String>,
    #[serde(default)]
    pub relation_type: Option<RelationType>,
}

/// Positive adjustment requested for one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reinforcement {
    pub entity_id: String,
    /// Delta to apply; the configured resolution boost when absent
    #[serde(default)]
    pub adjustment: Option<f32>,
    pub reason: String,
}

/// A resolved-issue trace submitted after a ticket is closed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionTrace {
    #[serde(default)]
    pub ticket_id: Option<String>,
    pub issue: String,
    #[serde(default)]
    pub steps: Vec<String>,
    pub success: bool,
    #[serde(default)]
    pub resolution_time_minutes: Option<u32>,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    /// `resolves` relations whose success rate should absorb this outcome
    #[serde(default)]
    pub relation_ids: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<LearnedEntity>,
    #[serde(default)]
    pub reinforcements: Vec<Reinforcement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningKind {
    NewEntity,
    NewRelation,
    Reinforcement,
    SuccessRate,
}

/// One learning derived from a resolution trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub kind: LearningKind,
    pub target_id: Option<String>,
    pub description: String,
    pub applied: bool,
}

impl Learning {
    fn applied(kind: LearningKind, target_id: &str, description: String) -> Self {
        Self {
            kind,
            target_id: Some(target_id.to_string()),
            description,
            applied: true,
        }
    }

    fn skipped(kind: LearningKind, target_id: Option<&str>, description: String) -> Self {
        Self {
            kind,
            target_id: target_id.map(str::to_string),
            description,
            applied: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub learnings: Vec<Learning>,
    pub applied_learnings: usize,
}

/// Applies feedback, resolution outcomes and manual overrides
pub struct Learner {
    store: Arc<GraphStore>,
    config: LearnerConfig,
    anomaly_threshold: f32,
}

impl Learner {
    pub fn new(store: Arc<GraphStore>, config: LearnerConfig) -> Self {
        Self {
            store,
            config,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
        }
    }

    /// Confidence below which feedback insights flag the target
    pub fn with_anomaly_threshold(mut self, threshold: f32) -> Self {
        self.anomaly_threshold = threshold;
        self
    }

    /// Delta for a star rating
    pub fn rating_adjustment(&self, rating: u8) -> f32 {
        match rating {
            r if r >= 4 => self.config.rating_boost,
            r if r <= 2 => -self.config.rating_penalty,
            _ => 0.0,
        }
    }

    pub fn sentiment_adjustment(&self, sentiment: Sentiment) -> f32 {
        match sentiment {
            Sentiment::Positive => self.config.positive_sentiment_boost,
            Sentiment::Negative => -self.config.negative_sentiment_penalty,
            Sentiment::Neutral => 0.0,
        }
    }

    /// Apply one feedback record to its target
    ///
    /// A missing target yields `success: false` instead of an error. A
    /// record whose idempotency key was already applied is reported as a
    /// duplicate.
    pub async fn submit_feedback(&self, mut record: FeedbackRecord) -> Result<FeedbackOutcome> {
        record.validate()?;
        let delta = self.rating_adjustment(record.rating) + self.sentiment_adjustment(record.sentiment);
        let key = record.effective_idempotency_key();
        // Stored keys are unique; cumulative mode must not store one.
        record.idempotency_key = self.config.idempotent.then(|| key.clone());

        let outcome = self
            .store
            .transact(|tx| {
                if self.config.idempotent {
                    if let Some(previous) = tx.state().feedback_for_key(&key) {
                        let previous = previous.to_string();
                        let current = current_confidence(tx, record.target_type, &record.target_id);
                        return Ok(FeedbackOutcome {
                            feedback_id: previous,
                            update_result: UpdateResult::duplicate(&record.target_id, current),
                            insights: Vec::new(),
                        });
                    }
                }

                if record.id.is_empty() || tx.state().get_feedback(&record.id).is_some() {
                    record.id = tx.next_id("fb");
                }
                let reason = format!("feedback:{}", record.id);

                let change = if record.target_type.is_relation() {
                    if tx.state().get_relation(&record.target_id).is_none() {
                        return Ok(not_found_outcome(&record));
                    }
                    tx.adjust_relation_confidence(&record.target_id, delta, &reason)?
                } else {
                    if tx.state().get_entity(&record.target_id).is_none() {
                        return Ok(not_found_outcome(&record));
                    }
                    tx.adjust_entity_confidence(&record.target_id, delta, &reason)?
                };

                record.processed = true;
                tx.emit(KnowledgeEvent::FeedbackApplied {
                    feedback_id: record.id.clone(),
                    target_id: record.target_id.clone(),
                    delta: change.delta(),
                    timestamp: Utc::now(),
                });
                tx.record_feedback(record.clone());

                let insights = self.feedback_insights(tx, &record, change);
                Ok(FeedbackOutcome {
                    feedback_id: record.id.clone(),
                    update_result: UpdateResult::applied(&record.target_id, change),
                    insights,
                })
            })
            .await?;

        match outcome.update_result.status {
            UpdateStatus::Applied => info!(
                feedback_id = %outcome.feedback_id,
                target_id = %outcome.update_result.target_id,
                delta = outcome.update_result.delta,
                "Feedback applied"
            ),
            UpdateStatus::Duplicate => debug!(
                feedback_id = %outcome.feedback_id,
                "Duplicate feedback ignored"
            ),
            UpdateStatus::NotFound => warn!(
                target_id = %outcome.update_result.target_id,
                "Feedback target not found"
            ),
        }
        Ok(outcome)
    }

    fn feedback_insights(
        &self,
        tx: &GraphTransaction<'_>,
        record: &FeedbackRecord,
        change: ConfidenceChange,
    ) -> Vec<Insight> {
        let mut insights = Vec::new();
        let target = record.target_id.clone();

        if change.new_confidence < self.anomaly_threshold && change.delta() < 0.0 {
            insights.push(
                Insight::new(
                    InsightType::Anomaly,
                    "Confidence degraded",
                    format!(
                        "Confidence of '{}' dropped to {:.2}, below the anomaly threshold {:.2}",
                        target, change.new_confidence, self.anomaly_threshold
                    ),
                )
                .with_confidence(0.8)
                .with_impact(Severity::Medium)
                .with_entities([target.clone()])
                .with_recommendation("Review or prune this knowledge"),
            );
        }

        if record.target_type == FeedbackTarget::Solution && record.rating >= 4 {
            insights.push(
                Insight::new(
                    InsightType::Pattern,
                    "Solution validated",
                    format!("Solution '{}' was confirmed by a user", target),
                )
                .with_confidence(change.new_confidence)
                .with_entities([target.clone()])
                .with_recommendation("Promote this solution in diagnoses"),
            );
        }

        let negative = tx
            .state()
            .feedback()
            .filter(|f| f.target_id == record.target_id && f.rating <= 2)
            .count();
        if record.rating <= 2 && negative >= RECURRING_NEGATIVE_FEEDBACK {
            insights.push(
                Insight::new(
                    InsightType::Correlation,
                    "Recurring negative feedback",
                    format!("'{}' received {} negative ratings", target, negative),
                )
                .with_confidence(0.7)
                .with_impact(Severity::High)
                .with_entities([target])
                .with_recommendation("Investigate why this knowledge keeps failing"),
            );
        }

        insights
    }

    /// Manual confidence override, clamped and audited
    pub async fn update_confidence(
        &self,
        target: ConfidenceTarget,
        new_confidence: f32,
        reason: &str,
    ) -> Result<UpdateResult> {
        if reason.trim().is_empty() {
            return Err(Error::InvalidInput("an override needs a reason".into()));
        }
        let reason = format!("manual: {}", reason.trim());

        let result = self
            .store
            .transact(|tx| {
                let change = match &target {
                    ConfidenceTarget::Entity(id) => {
                        if tx.state().get_entity(id).is_none() {
                            return Ok(UpdateResult::not_found(id));
                        }
                        tx.set_entity_confidence(id, new_confidence, &reason)?
                    }
                    ConfidenceTarget::Relation(id) => {
                        if tx.state().get_relation(id).is_none() {
                            return Ok(UpdateResult::not_found(id));
                        }
                        tx.set_relation_confidence(id, new_confidence, &reason)?
                    }
                };
                Ok(UpdateResult::applied(target.id(), change))
            })
            .await?;

        if result.success {
            info!(target_id = %result.target_id, new = ?result.new_confidence, "Confidence overridden");
        } else {
            warn!(target_id = %result.target_id, "Override target not found");
        }
        Ok(result)
    }

    /// Learn from a resolved issue in one transaction
    ///
    /// New entities and reinforcements only apply to successful
    /// resolutions; success-rate bookkeeping applies either way.
    pub async fn learn_from_resolution(&self, trace: &ResolutionTrace) -> Result<ResolutionOutcome> {
        if trace.issue.trim().is_empty() {
            return Err(Error::InvalidInput("issue must not be empty".into()));
        }

        let outcome = self
            .store
            .transact(|tx| {
                let mut learnings = Vec::new();
                if trace.success {
                    for learned in &trace.learnings {
                        self.learn_entity(tx, trace, learned, &mut learnings)?;
                    }
                    for reinforcement in &trace.reinforcements {
                        learnings.push(self.reinforce(tx, trace, reinforcement)?);
                    }
                }
                for rel_id in &trace.relation_ids {
                    learnings.push(record_resolution_outcome(tx, trace, rel_id)?);
                }

                let applied_learnings = learnings.iter().filter(|l| l.applied).count();
                Ok(ResolutionOutcome {
                    learnings,
                    applied_learnings,
                })
            })
            .await?;

        info!(
            ticket_id = trace.ticket_id.as_deref().unwrap_or("-"),
            success = trace.success,
            applied = outcome.applied_learnings,
            total = outcome.learnings.len(),
            "Learned from resolution"
        );
        Ok(outcome)
    }

    fn learn_entity(
        &self,
        tx: &mut GraphTransaction<'_>,
        trace: &ResolutionTrace,
        learned: &LearnedEntity,
        learnings: &mut Vec<Learning>,
    ) -> Result<()> {
        if learned.name.trim().is_empty() {
            learnings.push(Learning::skipped(
                LearningKind::NewEntity,
                None,
                "learned entity without a name".into(),
            ));
            return Ok(());
        }
        let confidence = learned
            .confidence
            .unwrap_or(self.config.learned_entity_confidence);

        let id = match tx
            .state()
            .find_by_canonical_name(&learned.name, learned.entity_type)
            .map(|e| e.id.clone())
        {
            Some(id) => {
                tx.update_entity(&id, |e| {
                    e.confidence = e.confidence.max(confidence);
                    if let Some(ticket) = &trace.ticket_id {
                        e.add_ticket(ticket.clone());
                    }
                    e.append_provenance("resolution_learning", trace.ticket_id.as_deref());
                })?;
                learnings.push(Learning::applied(
                    LearningKind::NewEntity,
                    &id,
                    format!("merged learned {} '{}'", learned.entity_type, learned.name),
                ));
                id
            }
            None => {
                let mut entity = Entity::new(tx.next_id("ent"), learned.name.trim(), learned.entity_type)
                    .with_description(learned.description.clone())
                    .with_confidence(confidence)
                    .with_property(SOURCE_KEY, "resolution_learning");
                if let Some(ticket) = &trace.ticket_id {
                    entity = entity.with_ticket(ticket.clone());
                }
                entity.append_provenance("resolution_learning", trace.ticket_id.as_deref());
                let id = entity.id.clone();
                tx.add_entity(entity)?;
                learnings.push(Learning::applied(
                    LearningKind::NewEntity,
                    &id,
                    format!("learned {} '{}'", learned.entity_type, learned.name),
                ));
                id
            }
        };

        let Some(related) = &learned.related_to else {
            return Ok(());
        };
        if !tx.state().contains_entity(related) {
            learnings.push(Learning::skipped(
                LearningKind::NewRelation,
                Some(related.as_str()),
                format!("related entity '{}' not found", related),
            ));
            return Ok(());
        }
        let relation_type = learned.relation_type.unwrap_or(RelationType::RelatedTo);
        if tx.state().relation_between(&id, related, relation_type).is_none() {
            let relation = Relation::new(tx.next_id("rel"), id.clone(), related.clone(), relation_type)
                .with_weight(confidence)
                .with_confidence(confidence)
                .with_property(SOURCE_KEY, "resolution_learning");
            let rel_id = relation.id.clone();
            tx.add_relation(relation)?;
            learnings.push(Learning::applied(
                LearningKind::NewRelation,
                &rel_id,
                format!("{} {} {}", id, relation_type, related),
            ));
        }
        Ok(())
    }

    fn reinforce(
        &self,
        tx: &mut GraphTransaction<'_>,
        trace: &ResolutionTrace,
        reinforcement: &Reinforcement,
    ) -> Result<Learning> {
        let id = &reinforcement.entity_id;
        if !tx.state().contains_entity(id) {
            return Ok(Learning::skipped(
                LearningKind::Reinforcement,
                Some(id.as_str()),
                format!("entity '{}' not found", id),
            ));
        }

        let adjustment = reinforcement
            .adjustment
            .unwrap_or(self.config.resolution_boost)
            .max(0.0);
        let change = tx.adjust_entity_confidence(id, adjustment, &reinforcement.reason)?;
        let entry = serde_json::json!({
            "reason": reinforcement.reason,
            "adjustment": adjustment,
            "ticketId": trace.ticket_id,
            "at": Utc::now().to_rfc3339(),
        });
        tx.update_entity(id, |e| push_property_entry(&mut e.properties, REINFORCEMENTS_KEY, entry))?;

        Ok(Learning::applied(
            LearningKind::Reinforcement,
            id,
            format!(
                "{:.2} -> {:.2}: {}",
                change.old_confidence, change.new_confidence, reinforcement.reason
            ),
        ))
    }
}

fn current_confidence(tx: &GraphTransaction<'_>, target: FeedbackTarget, id: &str) -> Option<f32> {
    if target.is_relation() {
        tx.state().get_relation(id).map(|r| r.confidence)
    } else {
        tx.state().get_entity(id).map(|e| e.confidence)
    }
}

fn not_found_outcome(record: &FeedbackRecord) -> FeedbackOutcome {
    FeedbackOutcome {
        feedback_id: record.id.clone(),
        update_result: UpdateResult::not_found(&record.target_id),
        insights: Vec::new(),
    }
}

fn record_resolution_outcome(
    tx: &mut GraphTransaction<'_>,
    trace: &ResolutionTrace,
    rel_id: &str,
) -> Result<Learning> {
    match tx.state().get_relation(rel_id) {
        Some(r) if r.relation_type == RelationType::Resolves => {}
        Some(r) => {
            return Ok(Learning::skipped(
                LearningKind::SuccessRate,
                Some(rel_id),
                format!("relation '{}' is {}, not resolves", rel_id, r.relation_type),
            ));
        }
        None => {
            return Ok(Learning::skipped(
                LearningKind::SuccessRate,
                Some(rel_id),
                format!("relation '{}' not found", rel_id),
            ));
        }
    }

    let rate = tx.update_relation(rel_id, |r| {
        if let Some(minutes) = trace.resolution_time_minutes {
            r.properties
                .insert("lastResolutionMinutes".into(), minutes.into());
        }
        r.record_outcome(trace.success)
    })?;
    Ok(Learning::applied(
        LearningKind::SuccessRate,
        rel_id,
        format!("success rate now {:.2}", rate),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::id::SequentialIdGenerator;
    use crate::domain::knowledge::repository::InMemoryGraphRepository;
    use crate::domain::knowledge::relation::SUCCESS_RATE_KEY;

    async fn seeded_store(confidence: f32) -> Arc<GraphStore> {
        let store = Arc::new(GraphStore::with_parts(
            Arc::new(InMemoryGraphRepository::new()),
            Arc::new(SequentialIdGenerator::new()),
        ));
        store
            .transact(|tx| {
                tx.add_entity(Entity::new("err", "Écran bleu", EntityType::Error).with_confidence(confidence))?;
                tx.add_entity(Entity::new("sol", "Mettre à jour le pilote", EntityType::Solution).with_confidence(0.7))?;
                tx.add_relation(
                    Relation::new("rel", "sol", "err", RelationType::Resolves)
                        .with_weight(0.8)
                        .with_confidence(0.7)
                        .with_property(SUCCESS_RATE_KEY, 0.75),
                )
            })
            .await
            .unwrap();
        store
    }

    fn learner(store: Arc<GraphStore>) -> Learner {
        Learner::new(store, LearnerConfig::default())
    }

    #[tokio::test]
    async fn test_positive_feedback_raises_confidence() {
        let store = seeded_store(0.9).await;
        let record = FeedbackRecord::new(FeedbackTarget::Entity, "err", 5)
            .with_sentiment(Sentiment::Positive);
        let outcome = learner(store.clone()).submit_feedback(record).await.unwrap();

        assert!(outcome.update_result.success);
        let confidence = store.get_entity("err").await.unwrap().confidence;
        assert!((confidence - 0.98).abs() < 1e-5);
        let stored = store.snapshot().await;
        assert!(stored.get_feedback(&outcome.feedback_id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_negative_feedback_clamps_at_floor() {
        let store = seeded_store(0.2).await;
        let record = FeedbackRecord::new(FeedbackTarget::Entity, "err", 1)
            .with_sentiment(Sentiment::Negative);
        let outcome = learner(store.clone()).submit_feedback(record).await.unwrap();

        assert!(outcome.update_result.clamped);
        assert_eq!(store.get_entity("err").await.unwrap().confidence, 0.1);
        assert!(
            outcome
                .insights
                .iter()
                .any(|i| i.insight_type == InsightType::Anomaly)
        );
    }

    #[tokio::test]
    async fn test_missing_target_is_not_an_error() {
        let store = seeded_store(0.5).await;
        let record = FeedbackRecord::new(FeedbackTarget::Relation, "nope", 5);
        let outcome = learner(store.clone()).submit_feedback(record).await.unwrap();

        assert!(!outcome.update_result.success);
        assert_eq!(outcome.update_result.status, UpdateStatus::NotFound);
        assert_eq!(store.snapshot().await.feedback().count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_not_reapplied() {
        let store = seeded_store(0.5).await;
        let learner = learner(store.clone());
        let record = FeedbackRecord::new(FeedbackTarget::Entity, "err", 5).with_idempotency_key("k-1");

        let first = learner.submit_feedback(record.clone()).await.unwrap();
        let second = learner.submit_feedback(record).await.unwrap();

        assert_eq!(second.update_result.status, UpdateStatus::Duplicate);
        assert_eq!(second.feedback_id, first.feedback_id);
        let confidence = store.get_entity("err").await.unwrap().confidence;
        assert!((confidence - 0.55).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_cumulative_when_idempotency_disabled() {
        let store = seeded_store(0.5).await;
        let config = LearnerConfig {
            idempotent: false,
            ..LearnerConfig::default()
        };
        let learner = Learner::new(store.clone(), config);
        let record = FeedbackRecord::new(FeedbackTarget::Entity, "err", 5).with_idempotency_key("k-1");

        learner.submit_feedback(record.clone()).await.unwrap();
        learner.submit_feedback(record).await.unwrap();

        let confidence = store.get_entity("err").await.unwrap().confidence;
        assert!((confidence - 0.6).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_invalid_rating_is_rejected() {
        let store = seeded_store(0.5).await;
        let err = learner(store)
            .submit_feedback(FeedbackRecord::new(FeedbackTarget::Entity, "err", 9))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_manual_override_is_clamped_and_audited() {
        let store = seeded_store(0.5).await;
        let result = learner(store.clone())
            .update_confidence(ConfidenceTarget::Relation("rel".into()), 1.7, "verified by L2")
            .await
            .unwrap();

        assert!(result.success && result.clamped);
        assert_eq!(result.new_confidence, Some(1.0));
        let events = store.recent_events(1).await;
        assert!(matches!(
            &events[0],
            KnowledgeEvent::ConfidenceChanged { reason, clamped: true, .. } if reason.contains("verified by L2")
        ));
    }

    #[tokio::test]
    async fn test_override_missing_target() {
        let store = seeded_store(0.5).await;
        let result = learner(store)
            .update_confidence(ConfidenceTarget::Entity("ghost".into()), 0.5, "cleanup")
            .await
            .unwrap();
        assert_eq!(result.status, UpdateStatus::NotFound);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_learn_from_successful_resolution() {
        let store = seeded_store(0.5).await;
        let trace = ResolutionTrace {
            ticket_id: Some("T-9".into()),
            issue: "Écran bleu après mise à jour".into(),
            steps: vec!["Démarrer en mode sans échec".into()],
            success: true,
            resolution_time_minutes: Some(25),
            relation_ids: vec!["rel".into()],
            learnings: vec![LearnedEntity {
                name: "Pilote graphique".into(),
                entity_type: EntityType::Component,
                description: String::new(),
                confidence: None,
                related_to: Some("err".into()),
                relation_type: Some(RelationType::Causes),
            }],
            reinforcements: vec![
                Reinforcement {
                    entity_id: "sol".into(),
                    adjustment: None,
                    reason: "resolved T-9".into(),
                },
                Reinforcement {
                    entity_id: "missing".into(),
                    adjustment: Some(0.1),
                    reason: "n/a".into(),
                },
            ],
            ..ResolutionTrace::default()
        };

        let outcome = learner(store.clone()).learn_from_resolution(&trace).await.unwrap();
        assert_eq!(outcome.learnings.len(), 5);
        assert_eq!(outcome.applied_learnings, 4);

        let state = store.snapshot().await;
        let learned = state
            .find_by_canonical_name("pilote graphique", EntityType::Component)
            .unwrap();
        assert!((learned.confidence - 0.6).abs() < 1e-5);
        assert!(state.relation_between(&learned.id, "err", RelationType::Causes).is_some());

        let solution = state.get_entity("sol").unwrap();
        assert!((solution.confidence - 0.75).abs() < 1e-5);
        assert_eq!(solution.properties[REINFORCEMENTS_KEY][0]["reason"], "resolved T-9");

        let rate = state.get_relation("rel").unwrap().success_rate().unwrap();
        assert!((rate - 0.875).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_resolution_only_updates_success_rate() {
        let store = seeded_store(0.5).await;
        let trace = ResolutionTrace {
            issue: "Écran bleu".into(),
            success: false,
            relation_ids: vec!["rel".into()],
            reinforcements: vec![Reinforcement {
                entity_id: "sol".into(),
                adjustment: None,
                reason: "should not apply".into(),
            }],
            ..ResolutionTrace::default()
        };

        let outcome = learner(store.clone()).learn_from_resolution(&trace).await.unwrap();
        assert_eq!(outcome.applied_learnings, 1);
        let state = store.snapshot().await;
        assert_eq!(state.get_entity("sol").unwrap().confidence, 0.7);
        assert!((state.get_relation("rel").unwrap().success_rate().unwrap() - 0.375).abs() < 1e-9);
    }
}
