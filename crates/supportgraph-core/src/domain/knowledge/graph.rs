//! In-memory graph state with adjacency and name indexes
//!
//! A `GraphState` is an immutable value once published by the store.
//! Readers hold it through an `Arc` and never observe a half-applied
//! transaction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityType};
use super::feedback::FeedbackRecord;
use super::relation::{Relation, RelationType};
use crate::error::{Error, Result};

/// Direction for graph traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
    /// Follow outgoing relations (source -> target)
    Outgoing,
    /// Follow incoming relations (target <- source)
    Incoming,
    /// Follow both directions
    #[default]
    Both,
}

/// A relation paired with the entity on its other end
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    pub relation: &'a Relation,
    pub entity: &'a Entity,
}

/// Summary counts over a graph state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub total_entities: usize,
    pub total_relations: usize,
    pub entities_by_type: BTreeMap<String, usize>,
    pub relations_by_type: BTreeMap<String, usize>,
    pub average_confidence: f32,
    pub feedback_records: usize,
}

/// Point-in-time contents of the knowledge graph
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    entities: HashMap<String, Entity>,
    relations: HashMap<String, Relation>,
    outgoing: HashMap<String, BTreeSet<String>>,
    incoming: HashMap<String, BTreeSet<String>>,
    by_name: HashMap<(EntityType, String), BTreeSet<String>>,
    feedback: BTreeMap<String, FeedbackRecord>,
    feedback_keys: HashMap<String, String>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from persisted rows
    ///
    /// Relations whose endpoints are missing are dropped with a warning so a
    /// damaged store can still be opened.
    pub fn from_parts(
        entities: Vec<Entity>,
        relations: Vec<Relation>,
        feedback: Vec<FeedbackRecord>,
    ) -> Result<Self> {
        let mut state = Self::new();
        for entity in entities {
            state.insert_entity(entity)?;
        }
        for relation in relations {
            if let Err(e) = state.insert_relation(relation) {
                tracing::warn!(error = %e, "Skipping dangling relation while loading graph");
            }
        }
        for record in feedback {
            state.insert_feedback(record);
        }
        Ok(state)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn get_entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_relation(&self, id: &str) -> Option<&Relation> {
        self.relations.get(id)
    }

    pub fn contains_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// All entities, ordered by id
    pub fn entities(&self) -> Vec<&Entity> {
        let mut all: Vec<&Entity> = self.entities.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// All relations, ordered by id
    pub fn relations(&self) -> Vec<&Relation> {
        let mut all: Vec<&Relation> = self.relations.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Entities of one type, ordered by id
    pub fn entities_of_type(&self, entity_type: EntityType) -> Vec<&Entity> {
        let mut matching: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        matching
    }

    /// Number of incident relations (incoming + outgoing)
    pub fn degree(&self, entity_id: &str) -> usize {
        let out = self.outgoing.get(entity_id).map_or(0, BTreeSet::len);
        let inc = self.incoming.get(entity_id).map_or(0, BTreeSet::len);
        out + inc
    }

    /// Ids of relations touching an entity, in id order
    pub fn incident_relation_ids(&self, entity_id: &str) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        if let Some(out) = self.outgoing.get(entity_id) {
            ids.extend(out.iter().cloned());
        }
        if let Some(inc) = self.incoming.get(entity_id) {
            ids.extend(inc.iter().cloned());
        }
        ids
    }

    /// Neighbors of an entity ordered by relation weight descending,
    /// ties broken by relation id
    ///
    /// A self-loop appears once per matching direction.
    pub fn neighbors(&self, entity_id: &str, direction: TraversalDirection) -> Vec<Neighbor<'_>> {
        let mut found = Vec::new();

        if matches!(
            direction,
            TraversalDirection::Outgoing | TraversalDirection::Both
        ) {
            for rel_id in self.outgoing.get(entity_id).into_iter().flatten() {
                if let Some(neighbor) = self.neighbor_via(rel_id, |r| &r.target_id) {
                    found.push(neighbor);
                }
            }
        }
        if matches!(
            direction,
            TraversalDirection::Incoming | TraversalDirection::Both
        ) {
            for rel_id in self.incoming.get(entity_id).into_iter().flatten() {
                if let Some(neighbor) = self.neighbor_via(rel_id, |r| &r.source_id) {
                    found.push(neighbor);
                }
            }
        }

        found.sort_by(|a, b| {
            b.relation
                .weight
                .total_cmp(&a.relation.weight)
                .then_with(|| a.relation.id.cmp(&b.relation.id))
        });
        found
    }

    /// Neighbors reached through relations of a single type
    pub fn neighbors_by_type(
        &self,
        entity_id: &str,
        direction: TraversalDirection,
        relation_type: RelationType,
    ) -> Vec<Neighbor<'_>> {
        self.neighbors(entity_id, direction)
            .into_iter()
            .filter(|n| n.relation.relation_type == relation_type)
            .collect()
    }

    fn neighbor_via<'a>(
        &'a self,
        rel_id: &str,
        other: impl Fn(&'a Relation) -> &'a String,
    ) -> Option<Neighbor<'a>> {
        let relation = self.relations.get(rel_id)?;
        let entity = self.entities.get(other(relation))?;
        Some(Neighbor { relation, entity })
    }

    /// Case-insensitive substring search over name and description
    ///
    /// Results are ordered by confidence descending, then id.
    pub fn find_by_name_or_type(
        &self,
        query: &str,
        type_filter: Option<EntityType>,
    ) -> Vec<&Entity> {
        let query = query.trim();
        let mut matching: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| type_filter.is_none_or(|t| e.entity_type == t))
            .filter(|e| query.is_empty() || e.matches_text(query))
            .collect();
        matching.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.id.cmp(&b.id))
        });
        matching
    }

    /// Exact lookup by normalized name and type
    pub fn find_by_canonical_name(&self, name: &str, entity_type: EntityType) -> Option<&Entity> {
        let key = (entity_type, Entity::canonicalize(name));
        self.by_name
            .get(&key)
            .and_then(|ids| ids.iter().next())
            .and_then(|id| self.entities.get(id))
    }

    /// First relation of a given type from `source_id` to `target_id`
    pub fn relation_between(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
    ) -> Option<&Relation> {
        self.outgoing
            .get(source_id)?
            .iter()
            .filter_map(|id| self.relations.get(id))
            .find(|r| r.target_id == target_id && r.relation_type == relation_type)
    }

    pub fn get_feedback(&self, id: &str) -> Option<&FeedbackRecord> {
        self.feedback.get(id)
    }

    /// Id of the feedback record already stored under an idempotency key
    pub fn feedback_for_key(&self, key: &str) -> Option<&str> {
        self.feedback_keys.get(key).map(String::as_str)
    }

    /// Feedback records, ordered by id
    pub fn feedback(&self) -> impl Iterator<Item = &FeedbackRecord> {
        self.feedback.values()
    }

    pub fn stats(&self) -> GraphStats {
        let mut entities_by_type = BTreeMap::new();
        for entity in self.entities.values() {
            *entities_by_type
                .entry(entity.entity_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        let mut relations_by_type = BTreeMap::new();
        for relation in self.relations.values() {
            *relations_by_type
                .entry(relation.relation_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        let average_confidence = if self.entities.is_empty() {
            0.0
        } else {
            self.entities.values().map(|e| e.confidence).sum::<f32>() / self.entities.len() as f32
        };

        GraphStats {
            total_entities: self.entities.len(),
            total_relations: self.relations.len(),
            entities_by_type,
            relations_by_type,
            average_confidence,
            feedback_records: self.feedback.len(),
        }
    }

    // Raw mutation, used by `GraphTransaction` on a private working copy.

    /// Upsert by id; rejects a type change
    pub(crate) fn insert_entity(&mut self, entity: Entity) -> Result<()> {
        if let Some(existing) = self.entities.get(&entity.id) {
            if existing.entity_type != entity.entity_type {
                return Err(Error::TypeConflict {
                    id: entity.id.clone(),
                    existing: existing.entity_type.to_string(),
                    requested: entity.entity_type.to_string(),
                });
            }
        }
        self.replace_entity(entity);
        Ok(())
    }

    /// Upsert by id without the type check, keeping the name index current
    pub(crate) fn replace_entity(&mut self, entity: Entity) {
        if let Some(previous) = self.entities.get(&entity.id) {
            let key = (previous.entity_type, previous.canonical_name.clone());
            self.unindex_name(&key, &entity.id);
        }
        self.by_name
            .entry((entity.entity_type, entity.canonical_name.clone()))
            .or_default()
            .insert(entity.id.clone());
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Insert a relation; both endpoints must already exist
    pub(crate) fn insert_relation(&mut self, relation: Relation) -> Result<()> {
        for endpoint in [&relation.source_id, &relation.target_id] {
            if !self.entities.contains_key(endpoint) {
                return Err(Error::UnknownEntity {
                    relation_id: relation.id.clone(),
                    entity_id: endpoint.clone(),
                });
            }
        }
        if let Some(previous) = self.relations.get(&relation.id).cloned() {
            self.unindex_relation(&previous);
        }
        self.outgoing
            .entry(relation.source_id.clone())
            .or_default()
            .insert(relation.id.clone());
        self.incoming
            .entry(relation.target_id.clone())
            .or_default()
            .insert(relation.id.clone());
        self.relations.insert(relation.id.clone(), relation);
        Ok(())
    }

    pub(crate) fn remove_relation(&mut self, id: &str) -> Option<Relation> {
        let relation = self.relations.remove(id)?;
        self.unindex_relation(&relation);
        Some(relation)
    }

    /// Remove an entity together with every incident relation
    pub(crate) fn remove_entity(&mut self, id: &str) -> Option<(Entity, Vec<Relation>)> {
        if !self.entities.contains_key(id) {
            return None;
        }
        let removed: Vec<Relation> = self
            .incident_relation_ids(id)
            .iter()
            .filter_map(|rel_id| self.remove_relation(rel_id))
            .collect();
        let entity = self.entities.remove(id)?;
        self.unindex_name(&(entity.entity_type, entity.canonical_name.clone()), id);
        self.outgoing.remove(id);
        self.incoming.remove(id);
        Some((entity, removed))
    }

    pub(crate) fn insert_feedback(&mut self, record: FeedbackRecord) {
        if let Some(key) = &record.idempotency_key {
            self.feedback_keys.insert(key.clone(), record.id.clone());
        }
        self.feedback.insert(record.id.clone(), record);
    }

    fn unindex_relation(&mut self, relation: &Relation) {
        if let Some(ids) = self.outgoing.get_mut(&relation.source_id) {
            ids.remove(&relation.id);
        }
        if let Some(ids) = self.incoming.get_mut(&relation.target_id) {
            ids.remove(&relation.id);
        }
    }

    fn unindex_name(&mut self, key: &(EntityType, String), id: &str) {
        if let Some(ids) = self.by_name.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_name.remove(key);
            }
        }
    }
}
