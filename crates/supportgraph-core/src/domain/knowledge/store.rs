//! The graph store: single owner of entity and relation state
//!
//! Readers take an `Arc<GraphState>` snapshot. Writers run closures through
//! [`GraphStore::transact`], one at a time, against a private working copy.
//! A transaction that returns `Err` leaves no trace; a successful one is
//! persisted through the repository first and published second.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::confidence::{ConfidenceChange, bound_confidence};
use super::entity::{Entity, EntityType};
use super::event::{KnowledgeEvent, TargetKind};
use super::feedback::FeedbackRecord;
use super::graph::GraphState;
use super::id::{IdGenerator, UuidIdGenerator};
use super::relation::Relation;
use super::repository::{ChangeSet, GraphRepository, InMemoryGraphRepository};
use crate::error::{Error, Result};

/// Default number of audit events kept in memory
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Shared, process-wide knowledge graph
///
/// Construct once at startup and pass by `Arc` to ingestion, learner,
/// diagnosis and analytics.
pub struct GraphStore {
    state: RwLock<Arc<GraphState>>,
    writer: Mutex<()>,
    repository: Arc<dyn GraphRepository>,
    ids: Arc<dyn IdGenerator>,
    events: Mutex<VecDeque<KnowledgeEvent>>,
    event_capacity: usize,
}

impl GraphStore {
    /// Open a store backed by `repository`, loading its current contents
    pub async fn open(
        repository: Arc<dyn GraphRepository>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self> {
        let state = repository.load_graph().await?;
        info!(
            backend = repository.name(),
            entities = state.entity_count(),
            relations = state.relation_count(),
            "Opened knowledge graph"
        );

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            repository,
            ids,
            events: Mutex::new(VecDeque::new()),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        })
    }

    /// Empty in-memory store with UUID ids
    pub fn in_memory() -> Self {
        Self::with_parts(Arc::new(InMemoryGraphRepository::new()), Arc::new(UuidIdGenerator))
    }

    /// Empty store over the given backend without loading it
    pub fn with_parts(repository: Arc<dyn GraphRepository>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: RwLock::new(Arc::new(GraphState::new())),
            writer: Mutex::new(()),
            repository,
            ids,
            events: Mutex::new(VecDeque::new()),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set how many audit events are retained
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Immutable point-in-time view of the graph
    pub async fn snapshot(&self) -> Arc<GraphState> {
        self.state.read().await.clone()
    }

    /// Fresh identifier from the store's generator
    pub fn next_id(&self, prefix: &str) -> String {
        self.ids.next_id(prefix)
    }

    /// Run a write transaction
    ///
    /// The closure sees and mutates a private copy. Returning `Err` discards
    /// the copy; otherwise the change set is persisted and the copy becomes
    /// the published state.
    pub async fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut GraphTransaction<'_>) -> Result<T>,
    {
        let _writer = self.writer.lock().await;
        let current = self.snapshot().await;
        let mut working = GraphState::clone(&current);

        let mut tx = GraphTransaction::new(&mut working, self.ids.as_ref());
        let value = f(&mut tx)?;
        let (changes, events) = tx.finish();

        if !changes.is_empty() {
            self.repository.apply_changes(&changes).await?;
            *self.state.write().await = Arc::new(working);
            debug!(
                entities = changes.upserted_entities.len(),
                relations = changes.upserted_relations.len(),
                deleted_entities = changes.deleted_entities.len(),
                deleted_relations = changes.deleted_relations.len(),
                "Committed graph transaction"
            );
        }

        self.record_events(events).await;
        Ok(value)
    }

    /// Add or update a single entity
    pub async fn add_entity(&self, entity: Entity) -> Result<()> {
        self.transact(|tx| tx.add_entity(entity)).await
    }

    /// Add or update a single relation
    pub async fn add_relation(&self, relation: Relation) -> Result<()> {
        self.transact(|tx| tx.add_relation(relation)).await
    }

    pub async fn get_entity(&self, id: &str) -> Option<Entity> {
        self.snapshot().await.get_entity(id).cloned()
    }

    pub async fn get_relation(&self, id: &str) -> Option<Relation> {
        self.snapshot().await.get_relation(id).cloned()
    }

    /// Most recent audit events, oldest first
    pub async fn recent_events(&self, limit: usize) -> Vec<KnowledgeEvent> {
        let events = self.events.lock().await;
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    async fn record_events(&self, new_events: Vec<KnowledgeEvent>) {
        if new_events.is_empty() {
            return;
        }
        let mut events = self.events.lock().await;
        events.extend(new_events);
        while events.len() > self.event_capacity {
            events.pop_front();
        }
    }
}

/// Mutable handle on a store's working copy during [`GraphStore::transact`]
///
/// Every mutation keeps confidence within bounds and refuses dangling
/// relations, so invariants hold at each step, not only at commit.
pub struct GraphTransaction<'a> {
    state: &'a mut GraphState,
    ids: &'a dyn IdGenerator,
    touched_entities: BTreeSet<String>,
    touched_relations: BTreeSet<String>,
    deleted_entities: BTreeSet<String>,
    deleted_relations: BTreeSet<String>,
    feedback: Vec<FeedbackRecord>,
    events: Vec<KnowledgeEvent>,
}

impl<'a> GraphTransaction<'a> {
    fn new(state: &'a mut GraphState, ids: &'a dyn IdGenerator) -> Self {
        Self {
            state,
            ids,
            touched_entities: BTreeSet::new(),
            touched_relations: BTreeSet::new(),
            deleted_entities: BTreeSet::new(),
            deleted_relations: BTreeSet::new(),
            feedback: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Read access to the working copy, including this transaction's writes
    pub fn state(&self) -> &GraphState {
        self.state
    }

    pub fn next_id(&self, prefix: &str) -> String {
        self.ids.next_id(prefix)
    }

    /// Upsert an entity by id; fails with `TypeConflict` on a type change
    pub fn add_entity(&mut self, mut entity: Entity) -> Result<()> {
        let bounded = bound_confidence(entity.confidence);
        if bounded.clamped {
            warn!(entity_id = %entity.id, requested = entity.confidence, "Clamped entity confidence");
        }
        entity.confidence = bounded.value;

        let is_new = !self.state.contains_entity(&entity.id);
        let event = KnowledgeEvent::EntityCreated {
            entity_id: entity.id.clone(),
            entity_type: entity.entity_type,
            name: entity.name.clone(),
            ticket_id: entity.ticket_ids.last().cloned(),
            timestamp: entity.created_at,
        };
        let id = entity.id.clone();
        self.state.insert_entity(entity)?;

        self.deleted_entities.remove(&id);
        self.touched_entities.insert(id);
        if is_new {
            self.events.push(event);
        }
        Ok(())
    }

    /// Upsert a relation; fails with `UnknownEntity` on a missing endpoint
    pub fn add_relation(&mut self, mut relation: Relation) -> Result<()> {
        relation.confidence = bound_confidence(relation.confidence).value;
        relation.weight = if relation.weight.is_nan() {
            0.0
        } else {
            relation.weight.clamp(0.0, 1.0)
        };

        let is_new = self.state.get_relation(&relation.id).is_none();
        let event = KnowledgeEvent::RelationCreated {
            relation_id: relation.id.clone(),
            source_id: relation.source_id.clone(),
            target_id: relation.target_id.clone(),
            relation_type: relation.relation_type,
            timestamp: relation.created_at,
        };
        let id = relation.id.clone();
        self.state.insert_relation(relation)?;

        self.deleted_relations.remove(&id);
        self.touched_relations.insert(id);
        if is_new {
            self.events.push(event);
        }
        Ok(())
    }

    /// Mutate an entity in place
    ///
    /// Type changes are refused here; use [`Self::recategorize`]. Confidence
    /// is re-bounded afterwards.
    pub fn update_entity<R>(&mut self, id: &str, f: impl FnOnce(&mut Entity) -> R) -> Result<R> {
        let mut entity = self
            .state
            .get_entity(id)
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;
        let original_type = entity.entity_type;
        let result = f(&mut entity);

        if entity.id != id {
            return Err(Error::InvalidInput(format!("entity id '{}' cannot change", id)));
        }
        if entity.entity_type != original_type {
            return Err(Error::TypeConflict {
                id: id.to_string(),
                existing: original_type.to_string(),
                requested: entity.entity_type.to_string(),
            });
        }
        entity.confidence = bound_confidence(entity.confidence).value;
        entity.canonical_name = Entity::canonicalize(&entity.name);
        self.state.replace_entity(entity);
        self.touched_entities.insert(id.to_string());
        Ok(result)
    }

    /// Mutate a relation in place; endpoints and id must not change
    pub fn update_relation<R>(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut Relation) -> R,
    ) -> Result<R> {
        let mut relation = self
            .state
            .get_relation(id)
            .cloned()
            .ok_or_else(|| Error::RelationNotFound(id.to_string()))?;
        let (source, target) = (relation.source_id.clone(), relation.target_id.clone());
        let result = f(&mut relation);

        if relation.id != id || relation.source_id != source || relation.target_id != target {
            return Err(Error::InvalidInput(format!(
                "relation '{}' cannot change its id or endpoints",
                id
            )));
        }
        relation.confidence = bound_confidence(relation.confidence).value;
        self.state.insert_relation(relation)?;
        self.touched_relations.insert(id.to_string());
        Ok(result)
    }

    /// Set an entity's confidence, recording the change and any clamping
    pub fn set_entity_confidence(
        &mut self,
        id: &str,
        confidence: f32,
        reason: &str,
    ) -> Result<ConfidenceChange> {
        let change = self.update_entity(id, |e| e.set_confidence(confidence))?;
        self.note_confidence_change(TargetKind::Entity, id, change, reason);
        Ok(change)
    }

    /// Shift an entity's confidence by `delta`
    pub fn adjust_entity_confidence(
        &mut self,
        id: &str,
        delta: f32,
        reason: &str,
    ) -> Result<ConfidenceChange> {
        let change = self.update_entity(id, |e| e.adjust_confidence(delta))?;
        self.note_confidence_change(TargetKind::Entity, id, change, reason);
        Ok(change)
    }

    /// Set a relation's confidence, recording the change and any clamping
    pub fn set_relation_confidence(
        &mut self,
        id: &str,
        confidence: f32,
        reason: &str,
    ) -> Result<ConfidenceChange> {
        let change = self.update_relation(id, |r| r.set_confidence(confidence))?;
        self.note_confidence_change(TargetKind::Relation, id, change, reason);
        Ok(change)
    }

    /// Shift a relation's confidence by `delta`
    pub fn adjust_relation_confidence(
        &mut self,
        id: &str,
        delta: f32,
        reason: &str,
    ) -> Result<ConfidenceChange> {
        let change = self.update_relation(id, |r| r.adjust_confidence(delta))?;
        self.note_confidence_change(TargetKind::Relation, id, change, reason);
        Ok(change)
    }

    fn note_confidence_change(
        &mut self,
        kind: TargetKind,
        id: &str,
        change: ConfidenceChange,
        reason: &str,
    ) {
        if change.clamped {
            warn!(
                target_id = %id,
                old = change.old_confidence,
                new = change.new_confidence,
                reason,
                "Confidence clamped to bounds"
            );
        }
        self.events
            .push(KnowledgeEvent::confidence_changed(kind, id, change, reason));
    }

    /// Change an entity's type; the only path that may do so
    ///
    /// Fails with `TypeConflict` when another entity of the new type already
    /// has the same canonical name.
    pub fn recategorize(&mut self, id: &str, new_type: EntityType, reason: &str) -> Result<()> {
        let mut entity = self
            .state
            .get_entity(id)
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;
        let old_type = entity.entity_type;
        if old_type == new_type {
            return Ok(());
        }
        if let Some(clash) = self.state.find_by_canonical_name(&entity.name, new_type) {
            return Err(Error::TypeConflict {
                id: clash.id.clone(),
                existing: new_type.to_string(),
                requested: format!("{} (from {})", new_type, id),
            });
        }

        entity.entity_type = new_type;
        entity.updated_at = chrono::Utc::now();
        self.state.replace_entity(entity);
        self.touched_entities.insert(id.to_string());
        self.events.push(KnowledgeEvent::EntityRecategorized {
            entity_id: id.to_string(),
            old_type,
            new_type,
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Delete an entity and cascade-delete its incident relations
    ///
    /// Returns the ids of the removed relations.
    pub fn remove_entity(&mut self, id: &str, reason: &str) -> Result<Vec<String>> {
        let (_, removed) = self
            .state
            .remove_entity(id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;

        let relation_ids: Vec<String> = removed.into_iter().map(|r| r.id).collect();
        for rel_id in &relation_ids {
            self.mark_relation_deleted(rel_id, "cascade");
        }
        self.touched_entities.remove(id);
        self.deleted_entities.insert(id.to_string());
        self.events.push(KnowledgeEvent::EntityDeleted {
            entity_id: id.to_string(),
            reason: Some(reason.to_string()),
            timestamp: chrono::Utc::now(),
        });
        Ok(relation_ids)
    }

    pub fn remove_relation(&mut self, id: &str, reason: &str) -> Result<()> {
        self.state
            .remove_relation(id)
            .ok_or_else(|| Error::RelationNotFound(id.to_string()))?;
        self.mark_relation_deleted(id, reason);
        Ok(())
    }

    fn mark_relation_deleted(&mut self, id: &str, reason: &str) {
        self.touched_relations.remove(id);
        self.deleted_relations.insert(id.to_string());
        self.events.push(KnowledgeEvent::RelationDeleted {
            relation_id: id.to_string(),
            reason: Some(reason.to_string()),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Store a feedback record alongside this transaction's graph changes
    pub fn record_feedback(&mut self, record: FeedbackRecord) {
        self.state.insert_feedback(record.clone());
        self.feedback.push(record);
    }

    /// Append an audit event
    pub fn emit(&mut self, event: KnowledgeEvent) {
        self.events.push(event);
    }

    fn finish(self) -> (ChangeSet, Vec<KnowledgeEvent>) {
        let upserted_entities = self
            .touched_entities
            .iter()
            .filter_map(|id| self.state.get_entity(id).cloned())
            .collect();
        let upserted_relations = self
            .touched_relations
            .iter()
            .filter_map(|id| self.state.get_relation(id).cloned())
            .collect();

        let changes = ChangeSet {
            upserted_entities,
            upserted_relations,
            deleted_entities: self.deleted_entities.into_iter().collect(),
            deleted_relations: self.deleted_relations.into_iter().collect(),
            recorded_feedback: self.feedback,
        };
        (changes, self.events)
    }
}
