//! Explicit maintenance operations
//!
//! Nothing here runs implicitly. Pruning and recategorization are only
//! performed when an operator asks for them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::entity::{Entity, EntityType};
use super::graph::GraphState;
use super::store::GraphStore;
use crate::error::{Error, Result};

/// Which entities a prune should remove
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneCriteria {
    /// Remove entities with confidence strictly below this
    #[serde(default)]
    pub min_confidence: Option<f32>,
    /// Remove entities not updated since this instant
    #[serde(default)]
    pub stale_before: Option<DateTime<Utc>>,
    /// Remove entities without relations; brands are kept
    #[serde(default)]
    pub remove_orphans: bool,
    /// Report what would be removed without removing it
    #[serde(default)]
    pub dry_run: bool,
}

impl PruneCriteria {
    fn is_empty(&self) -> bool {
        self.min_confidence.is_none() && self.stale_before.is_none() && !self.remove_orphans
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunedEntity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub dry_run: bool,
    pub removed_entities: Vec<PrunedEntity>,
    pub removed_relations: Vec<String>,
}

/// Entities matching the criteria in a snapshot, ordered by id
pub fn plan_prune(state: &GraphState, criteria: &PruneCriteria) -> Vec<PrunedEntity> {
    state
        .entities()
        .into_iter()
        .filter_map(|e| {
            let mut reasons = Vec::new();
            if let Some(floor) = criteria.min_confidence {
                if e.confidence < floor {
                    reasons.push(format!("confidence {:.2} below {:.2}", e.confidence, floor));
                }
            }
            if let Some(cutoff) = criteria.stale_before {
                if e.updated_at < cutoff {
                    reasons.push(format!("not updated since {}", e.updated_at.to_rfc3339()));
                }
            }
            if criteria.remove_orphans
                && e.entity_type != EntityType::Brand
                && state.degree(&e.id) == 0
            {
                reasons.push("orphan".to_string());
            }

            (!reasons.is_empty()).then(|| PrunedEntity {
                id: e.id.clone(),
                name: e.name.clone(),
                entity_type: e.entity_type,
                reasons,
            })
        })
        .collect()
}

pub struct Maintenance {
    store: Arc<GraphStore>,
}

impl Maintenance {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Remove matching entities and their relations in one transaction
    pub async fn prune(&self, criteria: &PruneCriteria) -> Result<PruneReport> {
        if criteria.is_empty() {
            return Err(Error::InvalidInput(
                "prune needs a confidence floor, a staleness cutoff or orphan removal".into(),
            ));
        }

        let report = self
            .store
            .transact(|tx| {
                let planned = plan_prune(tx.state(), criteria);
                let mut removed_relations = Vec::new();
                if !criteria.dry_run {
                    for entity in &planned {
                        let reason = format!("prune: {}", entity.reasons.join(", "));
                        removed_relations.extend(tx.remove_entity(&entity.id, &reason)?);
                    }
                } else {
                    for entity in &planned {
                        removed_relations.extend(tx.state().incident_relation_ids(&entity.id));
                    }
                    removed_relations.sort();
                    removed_relations.dedup();
                }
                Ok(PruneReport {
                    dry_run: criteria.dry_run,
                    removed_entities: planned,
                    removed_relations,
                })
            })
            .await?;

        info!(
            dry_run = report.dry_run,
            entities = report.removed_entities.len(),
            relations = report.removed_relations.len(),
            "Prune finished"
        );
        Ok(report)
    }

    /// Change an entity's type; fails on a name clash within the new type
    pub async fn recategorize(
        &self,
        entity_id: &str,
        new_type: EntityType,
        reason: &str,
    ) -> Result<Entity> {
        let entity = self
            .store
            .transact(|tx| {
                tx.recategorize(entity_id, new_type, reason)?;
                tx.state()
                    .get_entity(entity_id)
                    .cloned()
                    .ok_or_else(|| Error::EntityNotFound(entity_id.to_string()))
            })
            .await?;

        info!(entity_id, new_type = %new_type, reason, "Entity recategorized");
        Ok(entity)
    }
}
