//! Repository trait for knowledge graph persistence
//!
//! The store keeps the authoritative graph in memory and writes every
//! committed transaction through a `GraphRepository`. Backends only need to
//! load a full graph and apply change sets atomically.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

use super::entity::Entity;
use super::feedback::FeedbackRecord;
use super::graph::GraphState;
use super::relation::Relation;

/// Everything one committed store transaction changed
///
/// Deletions are applied before upserts; relation deletions before entity
/// deletions.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub upserted_entities: Vec<Entity>,
    pub upserted_relations: Vec<Relation>,
    pub deleted_entities: Vec<String>,
    pub deleted_relations: Vec<String>,
    pub recorded_feedback: Vec<FeedbackRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserted_entities.is_empty()
            && self.upserted_relations.is_empty()
            && self.deleted_entities.is_empty()
            && self.deleted_relations.is_empty()
            && self.recorded_feedback.is_empty()
    }
}

/// Repository trait for knowledge graph persistence
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Load the complete graph, including feedback records
    async fn load_graph(&self) -> Result<GraphState>;

    /// Apply one change set; either all of it is stored or none of it
    async fn apply_changes(&self, changes: &ChangeSet) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryTables {
    entities: BTreeMap<String, Entity>,
    relations: BTreeMap<String, Relation>,
    feedback: BTreeMap<String, FeedbackRecord>,
}

/// Repository that keeps rows in process memory
///
/// Used for tests and prototyping; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryGraphRepository {
    tables: RwLock<MemoryTables>,
}

impl InMemoryGraphRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load_graph(&self) -> Result<GraphState> {
        let tables = self.tables.read().await;
        GraphState::from_parts(
            tables.entities.values().cloned().collect(),
            tables.relations.values().cloned().collect(),
            tables.feedback.values().cloned().collect(),
        )
    }

    async fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        let mut tables = self.tables.write().await;
        for id in &changes.deleted_relations {
            tables.relations.remove(id);
        }
        for id in &changes.deleted_entities {
            tables.entities.remove(id);
        }
        for entity in &changes.upserted_entities {
            tables.entities.insert(entity.id.clone(), entity.clone());
        }
        for relation in &changes.upserted_relations {
            tables.relations.insert(relation.id.clone(), relation.clone());
        }
        for record in &changes.recorded_feedback {
            tables.feedback.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::entity::EntityType;
    use crate::domain::knowledge::relation::RelationType;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let repo = InMemoryGraphRepository::new();
        let changes = ChangeSet {
            upserted_entities: vec![
                Entity::new("a", "Dell", EntityType::Brand),
                Entity::new("b", "Latitude", EntityType::Equipment),
            ],
            upserted_relations: vec![Relation::new("r", "a", "b", RelationType::ManufacturedBy)],
            ..Default::default()
        };
        repo.apply_changes(&changes).await.unwrap();

        let state = repo.load_graph().await.unwrap();
        assert_eq!(state.entity_count(), 2);
        assert_eq!(state.degree("a"), 1);

        let delete = ChangeSet {
            deleted_relations: vec!["r".into()],
            deleted_entities: vec!["a".into()],
            ..Default::default()
        };
        repo.apply_changes(&delete).await.unwrap();
        let state = repo.load_graph().await.unwrap();
        assert_eq!(state.entity_count(), 1);
        assert_eq!(state.relation_count(), 0);
    }
}
