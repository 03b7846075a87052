//! Ingestion pipeline: ticket text → graph mutations
//!
//! The collaborator runs to completion before the store is touched. Its
//! payload is decoded strictly; then all entities and relations of the
//! ticket are written in one store transaction.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::entity::{Entity, EntityType, SOURCE_KEY};
use super::event::KnowledgeEvent;
use super::extractor::{Candidate, ExtractionCollaborator, parse_extraction_payload};
use super::graph::GraphState;
use super::relation::{Relation, RelationType, SUCCESS_RATE_KEY};
use super::store::{GraphStore, GraphTransaction};
use super::ticket::TicketInput;
use crate::config::IngestionConfig;
use crate::error::{Error, Result};

/// Brand → equipment
pub const MANUFACTURED_BY_WEIGHT: f32 = 0.9;
pub const MANUFACTURED_BY_CONFIDENCE: f32 = 0.85;
/// Equipment → error
pub const HAS_SYMPTOM_WEIGHT: f32 = 0.7;
pub const HAS_SYMPTOM_CONFIDENCE: f32 = 0.75;
/// Solution → error
pub const RESOLVES_WEIGHT: f32 = 0.8;
pub const RESOLVES_CONFIDENCE: f32 = 0.7;
pub const INITIAL_SUCCESS_RATE: f64 = 0.75;
/// Equipment → context entity
const CONTEXT_WEIGHT: f32 = 0.6;
const CONTEXT_CONFIDENCE: f32 = 0.6;
/// Weight of the first procedure step; later steps lose `STEP_WEIGHT_DECAY` each
const FIRST_STEP_WEIGHT: f32 = 1.0;
const STEP_WEIGHT_DECAY: f32 = 0.05;

/// What one enrichment added to the graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub ticket_id: String,
    pub added_entities: usize,
    pub added_relations: usize,
    /// Existing entities the ticket's candidates were merged into
    pub merged_entity_ids: Vec<String>,
    /// Candidates whose confidence had to be clamped
    pub clamped_candidates: usize,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

/// A ranked entity suggestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySuggestion {
    pub entity: Entity,
    pub score: f32,
    pub matched_on: MatchField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    NamePrefix,
    Name,
    Description,
}

/// Turns tickets into graph updates through an extraction collaborator
pub struct IngestionPipeline {
    store: Arc<GraphStore>,
    collaborator: Arc<dyn ExtractionCollaborator>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<GraphStore>,
        collaborator: Arc<dyn ExtractionCollaborator>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            store,
            collaborator,
            config,
        }
    }

    pub fn collaborator_name(&self) -> &'static str {
        self.collaborator.name()
    }

    /// Enrich the graph from one ticket
    ///
    /// On `ExtractionParseError`, timeout or collaborator failure the graph
    /// is left untouched and the caller may retry.
    pub async fn enrich_ticket(&self, ticket: &TicketInput) -> Result<EnrichmentResult> {
        if ticket.ticket_id.trim().is_empty() {
            return Err(Error::InvalidInput("ticketId must not be empty".into()));
        }
        if ticket.description.trim().is_empty() {
            return Err(Error::InvalidInput("description must not be empty".into()));
        }

        let raw = self.call_collaborator(ticket).await?;
        let validated = parse_extraction_payload(&raw).inspect_err(|e| {
            warn!(ticket_id = %ticket.ticket_id, error = %e, "Rejected extraction payload");
        })?;

        let min = self.config.min_candidate_confidence;
        let (candidates, dropped): (Vec<Candidate>, Vec<Candidate>) = validated
            .candidates
            .into_iter()
            .partition(|c| c.confidence() >= min);
        for candidate in &dropped {
            debug!(
                candidate = candidate.name(),
                confidence = candidate.confidence(),
                "Dropping low-confidence candidate"
            );
        }

        let source = self.collaborator.name();
        let mut result = self
            .store
            .transact(|tx| apply_candidates(tx, ticket, &candidates, source))
            .await?;
        result.clamped_candidates = validated.clamped.len();

        info!(
            ticket_id = %ticket.ticket_id,
            added_entities = result.added_entities,
            added_relations = result.added_relations,
            merged = result.merged_entity_ids.len(),
            "Ticket enriched"
        );
        Ok(result)
    }

    /// Run the collaborator with a timeout and at most one retry
    async fn call_collaborator(&self, ticket: &TicketInput) -> Result<String> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(timeout, self.collaborator.extract(ticket)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::ExtractionTimeout(self.config.timeout_secs)),
            };

            match outcome {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt == 1 && self.config.retry_on_transient && e.is_transient() => {
                    warn!(
                        ticket_id = %ticket.ticket_id,
                        collaborator = self.collaborator.name(),
                        error = %e,
                        "Extraction failed transiently, retrying once"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Entities matching a partial query, best first
    pub async fn suggest_entities(
        &self,
        query: &str,
        context: Option<&str>,
        limit: usize,
    ) -> Vec<EntitySuggestion> {
        let snapshot = self.store.snapshot().await;
        suggest_entities(&snapshot, query, context, limit)
    }
}

fn apply_candidates(
    tx: &mut GraphTransaction<'_>,
    ticket: &TicketInput,
    candidates: &[Candidate],
    source: &str,
) -> Result<EnrichmentResult> {
    let mut batch = Batch::default();

    // Entities first, grouped by kind so relation rules see the whole batch.
    for candidate in candidates {
        if let Candidate::Equipment(equipment) = candidate {
            let id = batch.upsert(tx, ticket, candidate, source)?;
            if let Some(model) = &equipment.model {
                tx.update_entity(&id, |e| {
                    e.properties.insert("model".into(), model.clone().into());
                })?;
            }
            if let Some(brand) = equipment.brand.as_deref().filter(|b| !b.trim().is_empty()) {
                let brand_id = batch.upsert_named(
                    tx,
                    ticket,
                    brand,
                    EntityType::Brand,
                    candidate.confidence(),
                    "",
                    source,
                )?;
                batch.brand_links.push((brand_id, id.clone()));
            }
            push_unique(&mut batch.equipment, id);
        }
    }
    for candidate in candidates {
        if let Candidate::Error(error) = candidate {
            let id = batch.upsert(tx, ticket, candidate, source)?;
            if let Some(code) = &error.code {
                tx.update_entity(&id, |e| {
                    e.properties.insert("code".into(), code.clone().into());
                })?;
            }
            push_unique(&mut batch.errors, id);
        }
    }
    for candidate in candidates {
        if let Candidate::Solution(solution) = candidate {
            let id = batch.upsert(tx, ticket, candidate, source)?;
            for (order, step) in solution.steps.iter().enumerate() {
                let step_id = batch.upsert_named(
                    tx,
                    ticket,
                    step,
                    EntityType::Procedure,
                    candidate.confidence(),
                    "",
                    source,
                )?;
                batch.steps.push((id.clone(), step_id, order));
            }
            push_unique(&mut batch.solutions, id);
        }
    }
    for candidate in candidates {
        if let Candidate::Context(context) = candidate {
            let id = batch.upsert(tx, ticket, candidate, source)?;
            batch.context.push((id, context.entity_type));
        }
    }

    // Relations.
    for (brand_id, equipment_id) in std::mem::take(&mut batch.brand_links) {
        batch.link(
            tx,
            &brand_id,
            &equipment_id,
            RelationType::ManufacturedBy,
            MANUFACTURED_BY_WEIGHT,
            MANUFACTURED_BY_CONFIDENCE,
            ticket,
        )?;
    }
    for equipment_id in batch.equipment.clone() {
        for error_id in batch.errors.clone() {
            batch.link(
                tx,
                &equipment_id,
                &error_id,
                RelationType::HasSymptom,
                HAS_SYMPTOM_WEIGHT,
                HAS_SYMPTOM_CONFIDENCE,
                ticket,
            )?;
        }
    }
    for solution_id in batch.solutions.clone() {
        for error_id in batch.errors.clone() {
            if let Some(rel_id) = batch.link(
                tx,
                &solution_id,
                &error_id,
                RelationType::Resolves,
                RESOLVES_WEIGHT,
                RESOLVES_CONFIDENCE,
                ticket,
            )? {
                tx.update_relation(&rel_id, |r| {
                    r.properties
                        .insert(SUCCESS_RATE_KEY.into(), INITIAL_SUCCESS_RATE.into());
                })?;
            }
        }
    }
    for (solution_id, step_id, order) in std::mem::take(&mut batch.steps) {
        let weight = (FIRST_STEP_WEIGHT - STEP_WEIGHT_DECAY * order as f32).max(0.1);
        let confidence = tx
            .state()
            .get_entity(&solution_id)
            .map_or(0.5, |e| e.confidence);
        if let Some(rel_id) = batch.link(
            tx,
            &solution_id,
            &step_id,
            RelationType::Requires,
            weight,
            confidence,
            ticket,
        )? {
            tx.update_relation(&rel_id, |r| {
                r.properties.insert("order".into(), (order + 1).into());
            })?;
        }
    }
    for (context_id, context_type) in std::mem::take(&mut batch.context) {
        for equipment_id in batch.equipment.clone() {
            let (source_id, target_id, relation_type) = match context_type {
                EntityType::Os | EntityType::Software => {
                    (&equipment_id, &context_id, RelationType::Runs)
                }
                EntityType::Location => (&equipment_id, &context_id, RelationType::LocatedAt),
                EntityType::Component => (&context_id, &equipment_id, RelationType::PartOf),
                EntityType::Symptom => (&equipment_id, &context_id, RelationType::HasSymptom),
                _ => (&equipment_id, &context_id, RelationType::RelatedTo),
            };
            batch.link(
                tx,
                source_id,
                target_id,
                relation_type,
                CONTEXT_WEIGHT,
                CONTEXT_CONFIDENCE,
                ticket,
            )?;
        }
    }

    let entities: Vec<Entity> = batch
        .created_entities
        .iter()
        .filter_map(|id| tx.state().get_entity(id).cloned())
        .collect();
    let relations: Vec<Relation> = batch
        .created_relations
        .iter()
        .filter_map(|id| tx.state().get_relation(id).cloned())
        .collect();

    tx.emit(KnowledgeEvent::TicketEnriched {
        ticket_id: ticket.ticket_id.clone(),
        entities_added: batch.created_entities.clone(),
        relations_added: batch.created_relations.clone(),
        timestamp: chrono::Utc::now(),
    });

    Ok(EnrichmentResult {
        ticket_id: ticket.ticket_id.clone(),
        added_entities: entities.len(),
        added_relations: relations.len(),
        merged_entity_ids: batch.merged_entities,
        clamped_candidates: 0,
        entities,
        relations,
    })
}

/// Working set of one ingestion batch
#[derive(Default)]
struct Batch {
    equipment: Vec<String>,
    errors: Vec<String>,
    solutions: Vec<String>,
    context: Vec<(String, EntityType)>,
    brand_links: Vec<(String, String)>,
    steps: Vec<(String, String, usize)>,
    created_entities: Vec<String>,
    merged_entities: Vec<String>,
    created_relations: Vec<String>,
}

impl Batch {
    fn upsert(
        &mut self,
        tx: &mut GraphTransaction<'_>,
        ticket: &TicketInput,
        candidate: &Candidate,
        source: &str,
    ) -> Result<String> {
        self.upsert_named(
            tx,
            ticket,
            candidate.name(),
            candidate.entity_type(),
            candidate.confidence(),
            candidate.description(),
            source,
        )
    }

    /// Merge into the entity with the same normalized name and type, or create one
    #[allow(clippy::too_many_arguments)]
    fn upsert_named(
        &mut self,
        tx: &mut GraphTransaction<'_>,
        ticket: &TicketInput,
        name: &str,
        entity_type: EntityType,
        confidence: f32,
        description: &str,
        source: &str,
    ) -> Result<String> {
        let name = name.trim();
        let existing = tx
            .state()
            .find_by_canonical_name(name, entity_type)
            .map(|e| e.id.clone());

        if let Some(id) = existing {
            let resulting = tx.update_entity(&id, |e| {
                e.confidence = e.confidence.max(confidence);
                e.add_ticket(ticket.ticket_id.clone());
                e.append_provenance(source, Some(&ticket.ticket_id));
                if e.description.is_empty() && !description.is_empty() {
                    e.description = description.to_string();
                }
                e.confidence
            })?;
            if !self.created_entities.contains(&id) {
                tx.emit(KnowledgeEvent::EntityMerged {
                    entity_id: id.clone(),
                    candidate_confidence: confidence,
                    resulting_confidence: resulting,
                    ticket_id: Some(ticket.ticket_id.clone()),
                    timestamp: chrono::Utc::now(),
                });
                push_unique(&mut self.merged_entities, id.clone());
            }
            return Ok(id);
        }

        let mut entity = Entity::new(tx.next_id("ent"), name, entity_type)
            .with_description(description)
            .with_confidence(confidence)
            .with_property(SOURCE_KEY, source)
            .with_ticket(ticket.ticket_id.clone());
        if let Some(category) = &ticket.category {
            entity = entity.with_property("category", category.clone());
        }
        entity.append_provenance(source, Some(&ticket.ticket_id));

        let id = entity.id.clone();
        tx.add_entity(entity)?;
        self.created_entities.push(id.clone());
        Ok(id)
    }

    /// Add a relation unless one of the same type already joins the pair
    ///
    /// Returns the id of a newly created relation.
    #[allow(clippy::too_many_arguments)]
    fn link(
        &mut self,
        tx: &mut GraphTransaction<'_>,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
        weight: f32,
        confidence: f32,
        ticket: &TicketInput,
    ) -> Result<Option<String>> {
        if source_id == target_id
            || tx
                .state()
                .relation_between(source_id, target_id, relation_type)
                .is_some()
        {
            return Ok(None);
        }

        let relation = Relation::new(tx.next_id("rel"), source_id, target_id, relation_type)
            .with_weight(weight)
            .with_confidence(confidence)
            .with_property("ticketId", ticket.ticket_id.clone());
        let id = relation.id.clone();
        tx.add_relation(relation)?;
        self.created_relations.push(id.clone());
        Ok(Some(id))
    }
}

fn push_unique(ids: &mut Vec<String>, id: String) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

/// Rank entities against a partial query
///
/// Name-prefix matches score highest, then name substrings, then
/// description substrings; each is scaled by confidence. Entities whose
/// neighbours are mentioned in `context` get a small boost.
pub fn suggest_entities(
    state: &GraphState,
    query: &str,
    context: Option<&str>,
    limit: usize,
) -> Vec<EntitySuggestion> {
    let query = query.trim().to_lowercase();
    if query.is_empty() || limit == 0 {
        return Vec::new();
    }
    let context = context.map(str::to_lowercase).unwrap_or_default();

    let mut suggestions: Vec<EntitySuggestion> = state
        .find_by_name_or_type(&query, None)
        .into_iter()
        .map(|entity| {
            let name = entity.name.to_lowercase();
            let (matched_on, base) = if name.starts_with(&query) {
                (MatchField::NamePrefix, 1.0)
            } else if name.contains(&query) {
                (MatchField::Name, 0.8)
            } else {
                (MatchField::Description, 0.5)
            };

            let context_boost = if !context.is_empty()
                && state
                    .neighbors(&entity.id, super::graph::TraversalDirection::Both)
                    .iter()
                    .any(|n| context.contains(&n.entity.name.to_lowercase()))
            {
                0.1
            } else {
                0.0
            };

            EntitySuggestion {
                entity: entity.clone(),
                score: base * entity.confidence + context_boost,
                matched_on,
            }
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.entity.id.cmp(&b.entity.id))
    });
    suggestions.truncate(limit);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::extractor::HeuristicExtractionCollaborator;
    use crate::domain::knowledge::id::SequentialIdGenerator;
    use crate::domain::knowledge::repository::InMemoryGraphRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Collaborator returning canned responses in order
    struct ScriptedCollaborator {
        responses: Vec<Result<String>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedCollaborator {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl ExtractionCollaborator for ScriptedCollaborator {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn extract(&self, _ticket: &TicketInput) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.responses.get(call) {
                Some(Ok(raw)) => Ok(raw.clone()),
                Some(Err(Error::RateLimited(s))) => Err(Error::RateLimited(*s)),
                Some(Err(e)) => Err(Error::Other(e.to_string())),
                None => Err(Error::Other("no more responses".into())),
            }
        }
    }

    fn store() -> Arc<GraphStore> {
        Arc::new(GraphStore::with_parts(
            Arc::new(InMemoryGraphRepository::new()),
            Arc::new(SequentialIdGenerator::new()),
        ))
    }

    fn pipeline(store: Arc<GraphStore>, collaborator: Arc<dyn ExtractionCollaborator>) -> IngestionPipeline {
        IngestionPipeline::new(store, collaborator, IngestionConfig::default())
    }

    const FULL_PAYLOAD: &str = r#"{"candidates": [
        {"kind": "equipment", "name": "HP LaserJet 400", "brand": "HP", "confidence": 0.9},
        {"kind": "error", "name": "bourrage papier", "confidence": 0.8},
        {"kind": "solution", "name": "Nettoyer les rouleaux", "steps": ["Ouvrir le capot", "Nettoyer", "Relancer"], "confidence": 0.7},
        {"kind": "context", "type": "location", "name": "Bureau 204", "confidence": 0.6}
    ]}"#;

    #[tokio::test]
    async fn test_enrichment_creates_entities_and_rules() {
        let store = store();
        let collaborator = Arc::new(ScriptedCollaborator::new(vec![Ok(FULL_PAYLOAD.into())]));
        let result = pipeline(store.clone(), collaborator)
            .enrich_ticket(&TicketInput::new("T-1", "Imprimante bloquée"))
            .await
            .unwrap();

        // equipment, brand, error, solution, 3 steps, location
        assert_eq!(result.added_entities, 8);
        let state = store.snapshot().await;

        let printer = state
            .find_by_canonical_name("hp laserjet 400", EntityType::Equipment)
            .unwrap();
        let brand = state.find_by_canonical_name("hp", EntityType::Brand).unwrap();
        let error = state
            .find_by_canonical_name("bourrage papier", EntityType::Error)
            .unwrap();
        let solution = state
            .find_by_canonical_name("nettoyer les rouleaux", EntityType::Solution)
            .unwrap();

        let made_by = state
            .relation_between(&brand.id, &printer.id, RelationType::ManufacturedBy)
            .unwrap();
        assert_eq!((made_by.weight, made_by.confidence), (0.9, 0.85));

        let symptom = state
            .relation_between(&printer.id, &error.id, RelationType::HasSymptom)
            .unwrap();
        assert_eq!((symptom.weight, symptom.confidence), (0.7, 0.75));

        let resolves = state
            .relation_between(&solution.id, &error.id, RelationType::Resolves)
            .unwrap();
        assert_eq!((resolves.weight, resolves.confidence), (0.8, 0.7));
        assert_eq!(resolves.success_rate(), Some(0.75));

        let steps = state.neighbors_by_type(
            &solution.id,
            super::super::graph::TraversalDirection::Outgoing,
            RelationType::Requires,
        );
        let names: Vec<&str> = steps.iter().map(|n| n.entity.name.as_str()).collect();
        assert_eq!(names, vec!["Ouvrir le capot", "Nettoyer", "Relancer"]);
        assert_eq!(printer.ticket_ids, vec!["T-1".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_candidates_merge_with_max_confidence() {
        let store = store();
        let first = r#"{"candidates": [{"kind": "error", "name": "Écran bleu", "confidence": 0.6}]}"#;
        let second = r#"{"candidates": [{"kind": "error", "name": "écran  BLEU", "confidence": 0.9}]}"#;
        let collaborator = Arc::new(ScriptedCollaborator::new(vec![
            Ok(first.into()),
            Ok(second.into()),
        ]));
        let pipeline = pipeline(store.clone(), collaborator);

        pipeline
            .enrich_ticket(&TicketInput::new("T-1", "a"))
            .await
            .unwrap();
        let result = pipeline
            .enrich_ticket(&TicketInput::new("T-2", "b"))
            .await
            .unwrap();

        assert_eq!(result.added_entities, 0);
        assert_eq!(result.merged_entity_ids.len(), 1);
        let state = store.snapshot().await;
        assert_eq!(state.entity_count(), 1);
        let error = state.entities()[0];
        assert_eq!(error.confidence, 0.9);
        assert_eq!(error.ticket_ids, vec!["T-1".to_string(), "T-2".to_string()]);
        assert_eq!(error.properties["provenance"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_leaves_graph_untouched() {
        let store = store();
        let collaborator = Arc::new(ScriptedCollaborator::new(vec![Ok(
            r#"{"candidates": [{"kind": "equipment", "name": "Dell", "confidence": 0.9}, {"kind": "mystery"}]}"#.into(),
        )]));
        let err = pipeline(store.clone(), collaborator)
            .enrich_ticket(&TicketInput::new("T-1", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExtractionParseError(_)));
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let store = store();
        let collaborator = Arc::new(ScriptedCollaborator::new(vec![
            Err(Error::RateLimited(1)),
            Ok(r#"{"candidates": []}"#.into()),
        ]));
        let result = pipeline(store, collaborator.clone())
            .enrich_ticket(&TicketInput::new("T-1", "x"))
            .await
            .unwrap();

        assert_eq!(result.added_entities, 0);
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_is_not_retried() {
        let collaborator = Arc::new(ScriptedCollaborator::new(vec![
            Err(Error::RateLimited(1)),
            Err(Error::RateLimited(1)),
            Ok(r#"{"candidates": []}"#.into()),
        ]));
        let err = pipeline(store(), collaborator.clone())
            .enrich_ticket(&TicketInput::new("T-1", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RateLimited(_)));
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_collaborator_times_out() {
        let mut slow = ScriptedCollaborator::new(vec![
            Ok(r#"{"candidates": []}"#.into()),
            Ok(r#"{"candidates": []}"#.into()),
        ]);
        slow.delay = Some(Duration::from_secs(600));
        let collaborator = Arc::new(slow);

        let err = pipeline(store(), collaborator.clone())
            .enrich_ticket(&TicketInput::new("T-1", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExtractionTimeout(45)));
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_description_is_rejected() {
        let collaborator = Arc::new(HeuristicExtractionCollaborator::new());
        let err = pipeline(store(), collaborator)
            .enrich_ticket(&TicketInput::new("T-1", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_suggestions_rank_prefix_first() {
        let store = store();
        store
            .transact(|tx| {
                tx.add_entity(Entity::new("a", "Imprimante HP", EntityType::Equipment).with_confidence(0.6))?;
                tx.add_entity(Entity::new("b", "Bourrage imprimante", EntityType::Error).with_confidence(0.9))?;
                tx.add_entity(
                    Entity::new("c", "Toner", EntityType::Component)
                        .with_description("Cartouche pour imprimante")
                        .with_confidence(0.9),
                )
            })
            .await
            .unwrap();

        let collaborator = Arc::new(HeuristicExtractionCollaborator::new());
        let suggestions = pipeline(store, collaborator)
            .suggest_entities("imprim", None, 10)
            .await;

        let ids: Vec<&str> = suggestions.iter().map(|s| s.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(suggestions[1].matched_on, MatchField::NamePrefix);
        assert_eq!(suggestions[2].matched_on, MatchField::Description);
    }

    #[test]
    fn test_suggestion_context_boosts_without_filtering() {
        let mut state = GraphState::new();
        state
            .insert_entity(Entity::new("a", "Écran bleu", EntityType::Error))
            .unwrap();
        state
            .insert_entity(Entity::new("b", "Écran noir", EntityType::Error))
            .unwrap();
        state
            .insert_entity(Entity::new("lat", "Dell Latitude", EntityType::Equipment))
            .unwrap();
        state
            .insert_relation(Relation::new("r", "lat", "b", RelationType::HasSymptom))
            .unwrap();

        let plain = suggest_entities(&state, "écran", None, 10);
        let ids: Vec<&str> = plain.iter().map(|s| s.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let boosted = suggest_entities(&state, "écran", Some("Poste Dell Latitude du 3e"), 10);
        let ids: Vec<&str> = boosted.iter().map(|s| s.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!((boosted[0].score - boosted[1].score - 0.1).abs() < 1e-6);
    }
}
