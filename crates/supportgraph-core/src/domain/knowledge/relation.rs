//! Knowledge relations for the support graph
//!
//! Relations are directed edges between two existing entities. Direction
//! carries meaning: `resolves` points solution → error, `manufactured-by`
//! points brand → equipment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::confidence::{ConfidenceChange, bound_confidence};
use super::entity::Properties;

/// Property key for the observed success rate of a `resolves` relation
pub const SUCCESS_RATE_KEY: &str = "successRate";

/// Property key for the number of outcomes folded into `successRate`
pub const SUCCESS_SAMPLES_KEY: &str = "successSamples";

/// A directed relation between two knowledge entities
///
/// Both endpoints are shared references into the store; the store refuses
/// relations whose endpoints are missing and cascades deletes onto them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Unique identifier for the relation
    pub id: String,
    /// ID of the source entity
    pub source_id: String,
    /// ID of the target entity
    pub target_id: String,
    /// Type of relation
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    /// Strength of the relation (0.0 to 1.0), independent of confidence
    pub weight: f32,
    /// Confidence score, always within [0.1, 1.0]
    pub confidence: f32,
    #[serde(default)]
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relation {
    /// Create a new relation between two entities
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: RelationType,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            weight: 0.5,
            confidence: 0.5,
            properties: Properties::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the weight (clamped to 0.0-1.0)
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, 1.0)
        };
        self
    }

    /// Set confidence score (clamped to 0.1-1.0)
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = bound_confidence(confidence).value;
        self
    }

    /// Set a single property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Override the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// Set confidence to an absolute value, clamped to [0.1, 1.0]
    pub fn set_confidence(&mut self, confidence: f32) -> ConfidenceChange {
        let bounded = bound_confidence(confidence);
        let change = ConfidenceChange {
            old_confidence: self.confidence,
            new_confidence: bounded.value,
            clamped: bounded.clamped,
        };
        self.confidence = bounded.value;
        self.updated_at = Utc::now();
        change
    }

    /// Shift confidence by a delta, clamped to [0.1, 1.0]
    pub fn adjust_confidence(&mut self, delta: f32) -> ConfidenceChange {
        self.set_confidence(self.confidence + delta)
    }

    /// The other endpoint of this relation, seen from `entity_id`
    pub fn other_end(&self, entity_id: &str) -> &str {
        if self.source_id == entity_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }

    /// Whether the relation touches the given entity
    pub fn touches(&self, entity_id: &str) -> bool {
        self.source_id == entity_id || self.target_id == entity_id
    }

    /// Current `successRate` property, if any
    pub fn success_rate(&self) -> Option<f64> {
        self.properties.get(SUCCESS_RATE_KEY).and_then(Value::as_f64)
    }

    /// Fold one resolution outcome into the running `successRate` average
    ///
    /// The seeded rate counts as a single prior sample.
    pub fn record_outcome(&mut self, success: bool) -> f64 {
        let samples = self
            .properties
            .get(SUCCESS_SAMPLES_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(1);
        let current = self.success_rate().unwrap_or(0.5);
        let observed = if success { 1.0 } else { 0.0 };
        let updated = (current * samples as f64 + observed) / (samples as f64 + 1.0);

        self.properties
            .insert(SUCCESS_RATE_KEY.to_string(), Value::from(updated));
        self.properties
            .insert(SUCCESS_SAMPLES_KEY.to_string(), Value::from(samples + 1));
        self.updated_at = Utc::now();
        updated
    }
}

/// Types of relations between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationType {
    /// Brand → equipment
    ManufacturedBy,
    /// Equipment → error or symptom
    HasSymptom,
    /// Solution → error
    Resolves,
    /// Cause → effect
    Causes,
    /// Solution → procedure step
    Requires,
    /// Component → equipment
    PartOf,
    /// Equipment → operating system or software
    Runs,
    /// Equipment → location
    LocatedAt,
    /// Generic association
    RelatedTo,
}

impl RelationType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManufacturedBy => "manufactured-by",
            Self::HasSymptom => "has-symptom",
            Self::Resolves => "resolves",
            Self::Causes => "causes",
            Self::Requires => "requires",
            Self::PartOf => "part-of",
            Self::Runs => "runs",
            Self::LocatedAt => "located-at",
            Self::RelatedTo => "related-to",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "manufactured-by" => Some(Self::ManufacturedBy),
            "has-symptom" => Some(Self::HasSymptom),
            "resolves" => Some(Self::Resolves),
            "causes" => Some(Self::Causes),
            "requires" => Some(Self::Requires),
            "part-of" => Some(Self::PartOf),
            "runs" => Some(Self::Runs),
            "located-at" => Some(Self::LocatedAt),
            "related-to" => Some(Self::RelatedTo),
            _ => None,
        }
    }

    /// Get all relation types
    pub fn all() -> &'static [RelationType] {
        &[
            Self::ManufacturedBy,
            Self::HasSymptom,
            Self::Resolves,
            Self::Causes,
            Self::Requires,
            Self::PartOf,
            Self::Runs,
            Self::LocatedAt,
            Self::RelatedTo,
        ]
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
