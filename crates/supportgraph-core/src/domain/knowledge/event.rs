//! Domain events for the knowledge graph
//!
//! Every committed store transaction emits events describing what changed.
//! They form the audit trail for confidence changes and maintenance actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityType;
use super::relation::RelationType;

/// Which kind of record a confidence change applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Entity,
    Relation,
}

/// Events that can occur in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum KnowledgeEvent {
    /// A new entity was created
    EntityCreated {
        entity_id: String,
        entity_type: EntityType,
        name: String,
        ticket_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// An extraction candidate was folded into an existing entity
    EntityMerged {
        entity_id: String,
        candidate_confidence: f32,
        resulting_confidence: f32,
        ticket_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// An entity type was changed by explicit recategorization
    EntityRecategorized {
        entity_id: String,
        old_type: EntityType,
        new_type: EntityType,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// An entity was deleted by maintenance
    EntityDeleted {
        entity_id: String,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A new relation was created
    RelationCreated {
        relation_id: String,
        source_id: String,
        target_id: String,
        relation_type: RelationType,
        timestamp: DateTime<Utc>,
    },
    /// A relation was deleted, directly or by cascade
    RelationDeleted {
        relation_id: String,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Confidence of an entity or relation moved
    ConfidenceChanged {
        target_kind: TargetKind,
        target_id: String,
        old_confidence: f32,
        new_confidence: f32,
        /// The requested value fell outside [0.1, 1.0]
        clamped: bool,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A feedback record was consumed by the learner
    FeedbackApplied {
        feedback_id: String,
        target_id: String,
        delta: f32,
        timestamp: DateTime<Utc>,
    },
    /// A ticket was enriched by the ingestion pipeline
    TicketEnriched {
        ticket_id: String,
        entities_added: Vec<String>,
        relations_added: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl KnowledgeEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::EntityCreated { timestamp, .. }
            | Self::EntityMerged { timestamp, .. }
            | Self::EntityRecategorized { timestamp, .. }
            | Self::EntityDeleted { timestamp, .. }
            | Self::RelationCreated { timestamp, .. }
            | Self::RelationDeleted { timestamp, .. }
            | Self::ConfidenceChanged { timestamp, .. }
            | Self::FeedbackApplied { timestamp, .. }
            | Self::TicketEnriched { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::EntityCreated { .. } => "entity_created",
            Self::EntityMerged { .. } => "entity_merged",
            Self::EntityRecategorized { .. } => "entity_recategorized",
            Self::EntityDeleted { .. } => "entity_deleted",
            Self::RelationCreated { .. } => "relation_created",
            Self::RelationDeleted { .. } => "relation_deleted",
            Self::ConfidenceChanged { .. } => "confidence_changed",
            Self::FeedbackApplied { .. } => "feedback_applied",
            Self::TicketEnriched { .. } => "ticket_enriched",
        }
    }

    /// Get the primary entity/aggregate ID for this event
    pub fn aggregate_id(&self) -> &str {
        match self {
            Self::EntityCreated { entity_id, .. }
            | Self::EntityMerged { entity_id, .. }
            | Self::EntityRecategorized { entity_id, .. }
            | Self::EntityDeleted { entity_id, .. } => entity_id,
            Self::RelationCreated { relation_id, .. }
            | Self::RelationDeleted { relation_id, .. } => relation_id,
            Self::ConfidenceChanged { target_id, .. }
            | Self::FeedbackApplied { target_id, .. } => target_id,
            Self::TicketEnriched { ticket_id, .. } => ticket_id,
        }
    }

    /// Create a new ConfidenceChanged event
    pub fn confidence_changed(
        target_kind: TargetKind,
        target_id: impl Into<String>,
        change: super::confidence::ConfidenceChange,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConfidenceChanged {
            target_kind,
            target_id: target_id.into(),
            old_confidence: change.old_confidence,
            new_confidence: change.new_confidence,
            clamped: change.clamped,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::confidence::ConfidenceChange;

    #[test]
    fn test_confidence_event() {
        let event = KnowledgeEvent::confidence_changed(
            TargetKind::Entity,
            "ent-1",
            ConfidenceChange {
                old_confidence: 0.2,
                new_confidence: 0.1,
                clamped: true,
            },
            "feedback fb-1",
        );

        assert_eq!(event.event_type_name(), "confidence_changed");
        assert_eq!(event.aggregate_id(), "ent-1");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "confidence_changed");
        assert_eq!(json["clamped"], true);
    }

    #[test]
    fn test_ticket_event_aggregate() {
        let event = KnowledgeEvent::TicketEnriched {
            ticket_id: "T-9".into(),
            entities_added: vec!["ent-1".into()],
            relations_added: vec![],
            timestamp: Utc::now(),
        };
        assert_eq!(event.aggregate_id(), "T-9");
    }
}
