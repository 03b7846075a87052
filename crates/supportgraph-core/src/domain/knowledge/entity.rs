//! Knowledge entity types for the support graph
//!
//! Entities are the typed nodes of the graph: equipment, errors, symptoms,
//! solutions, brands, procedures and the context they appear in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::confidence::{ConfidenceChange, bound_confidence};

/// Arbitrary string-keyed attributes attached to entities and relations
pub type Properties = Map<String, Value>;

/// Property key holding the provenance trail of an entity
pub const PROVENANCE_KEY: &str = "provenance";

/// Property key holding the origin tag (e.g. `ai_extraction`)
pub const SOURCE_KEY: &str = "source";

/// Property key counting every provenance entry ever appended
pub const MERGE_COUNT_KEY: &str = "mergeCount";

/// Array-valued trails keep only their most recent entries
pub const MAX_TRAIL_ENTRIES: usize = 20;

/// A knowledge entity: one node of the support graph
///
/// `ticket_ids` are weak back-references to the tickets an entity was seen
/// in. They never own anything and are never used to cascade deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique identifier for the entity
    pub id: String,
    /// Type of the entity; changed only by explicit recategorization
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Human-readable name
    pub name: String,
    /// Normalized name used for deduplication
    pub canonical_name: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Arbitrary attributes, including provenance tags
    #[serde(default)]
    pub properties: Properties,
    /// Confidence score, always within [0.1, 1.0]
    pub confidence: f32,
    /// When the entity was created
    pub created_at: DateTime<Utc>,
    /// When the entity was last updated
    pub updated_at: DateTime<Utc>,
    /// Tickets this entity was extracted from
    #[serde(default)]
    pub ticket_ids: Vec<String>,
}

impl Entity {
    /// Create a new entity with the default confidence of 0.5
    pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into();
        let canonical_name = Self::canonicalize(&name);
        let now = Utc::now();

        Self {
            id: id.into(),
            entity_type,
            name,
            canonical_name,
            description: String::new(),
            properties: Properties::new(),
            confidence: 0.5,
            created_at: now,
            updated_at: now,
            ticket_ids: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
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

    /// Attach an originating ticket
    pub fn with_ticket(mut self, ticket_id: impl Into<String>) -> Self {
        self.add_ticket(ticket_id.into());
        self
    }

    /// Override the creation timestamp (used when loading or backfilling)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// Add a ticket back-reference
    pub fn add_ticket(&mut self, ticket_id: String) {
        if !self.ticket_ids.contains(&ticket_id) {
            self.ticket_ids.push(ticket_id);
            self.updated_at = Utc::now();
        }
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

    /// Append an entry to the provenance trail
    pub fn append_provenance(&mut self, source: &str, ticket_id: Option<&str>) {
        let entry = serde_json::json!({
            "source": source,
            "ticketId": ticket_id,
            "at": Utc::now().to_rfc3339(),
        });
        let previous = self
            .properties
            .get(MERGE_COUNT_KEY)
            .and_then(Value::as_u64)
            .unwrap_or_else(|| {
                self.properties
                    .get(PROVENANCE_KEY)
                    .and_then(Value::as_array)
                    .map_or(0, |trail| trail.len() as u64)
            });
        push_property_entry(&mut self.properties, PROVENANCE_KEY, entry);
        self.properties
            .insert(MERGE_COUNT_KEY.to_string(), Value::from(previous + 1));
        self.updated_at = Utc::now();
    }

    /// Case-insensitive substring match over name and description
    pub fn matches_text(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return false;
        }
        self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }

    /// Canonicalize a name for deduplication
    ///
    /// Lowercases, drops punctuation and collapses whitespace. `+` and `#`
    /// survive so that "C++" and "C#" stay distinct from "C".
    pub fn canonicalize(name: &str) -> String {
        name.to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '+' | '#'))
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Push a JSON value onto an array-valued property, creating it if needed
///
/// The oldest entries are dropped beyond [`MAX_TRAIL_ENTRIES`].
pub(crate) fn push_property_entry(properties: &mut Properties, key: &str, entry: Value) {
    match properties.get_mut(key) {
        Some(Value::Array(items)) => {
            items.push(entry);
            let excess = items.len().saturating_sub(MAX_TRAIL_ENTRIES);
            items.drain(..excess);
        }
        _ => {
            properties.insert(key.to_string(), Value::Array(vec![entry]));
        }
    }
}

/// Types of knowledge entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Physical device (e.g., "Dell Latitude 5420", "HP LaserJet")
    Equipment,
    /// Error or fault (e.g., "écran bleu", "paper jam")
    Error,
    /// Known fix (e.g., "update the graphics driver")
    Solution,
    /// Manufacturer (e.g., "Dell", "Canon")
    Brand,
    /// Product model (e.g., "Latitude 5420")
    Model,
    /// Operating system (e.g., "Windows 11")
    Os,
    /// Application software (e.g., "Outlook")
    Software,
    /// Hardware part (e.g., "RAM", "disque dur")
    Component,
    /// Observable symptom (e.g., "no display")
    Symptom,
    /// Recorded diagnosis
    Diagnosis,
    /// Step of a resolution procedure
    Procedure,
    /// Site or room
    Location,
    /// Person
    User,
}

impl EntityType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::Error => "error",
            Self::Solution => "solution",
            Self::Brand => "brand",
            Self::Model => "model",
            Self::Os => "os",
            Self::Software => "software",
            Self::Component => "component",
            Self::Symptom => "symptom",
            Self::Diagnosis => "diagnosis",
            Self::Procedure => "procedure",
            Self::Location => "location",
            Self::User => "user",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "equipment" | "device" | "hardware" => Some(Self::Equipment),
            "error" | "issue" | "fault" => Some(Self::Error),
            "solution" | "fix" => Some(Self::Solution),
            "brand" | "manufacturer" | "vendor" => Some(Self::Brand),
            "model" => Some(Self::Model),
            "os" | "operating_system" => Some(Self::Os),
            "software" | "application" | "app" => Some(Self::Software),
            "component" | "part" => Some(Self::Component),
            "symptom" => Some(Self::Symptom),
            "diagnosis" => Some(Self::Diagnosis),
            "procedure" | "step" => Some(Self::Procedure),
            "location" | "site" => Some(Self::Location),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    /// Get all entity types
    pub fn all() -> &'static [EntityType] {
        &[
            Self::Equipment,
            Self::Error,
            Self::Solution,
            Self::Brand,
            Self::Model,
            Self::Os,
            Self::Software,
            Self::Component,
            Self::Symptom,
            Self::Diagnosis,
            Self::Procedure,
            Self::Location,
            Self::User,
        ]
    }

    /// Whether entities of this type can be the cause of a reported problem
    pub fn is_cause(&self) -> bool {
        matches!(self, Self::Error | Self::Symptom)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::confidence::MIN_CONFIDENCE;

    #[test]
    fn test_entity_creation() {
        let entity = Entity::new("ent-1", "Dell Latitude", EntityType::Equipment)
            .with_description("Business laptop")
            .with_confidence(0.8)
            .with_ticket("T-100");

        assert_eq!(entity.id, "ent-1");
        assert_eq!(entity.canonical_name, "dell latitude");
        assert_eq!(entity.entity_type, EntityType::Equipment);
        assert_eq!(entity.confidence, 0.8);
        assert_eq!(entity.ticket_ids, vec!["T-100".to_string()]);
    }

    #[test]
    fn test_canonicalization() {
        assert_eq!(Entity::canonicalize("Écran Bleu"), "écran bleu");
        assert_eq!(Entity::canonicalize("Wi-Fi"), "wifi");
        assert_eq!(Entity::canonicalize("C++"), "c++");
        assert_ne!(Entity::canonicalize("C++"), Entity::canonicalize("C"));
        assert_ne!(Entity::canonicalize("C#"), Entity::canonicalize("C"));
        assert_ne!(Entity::canonicalize("C#"), Entity::canonicalize("C++"));
        assert_eq!(
            Entity::canonicalize("  Multiple   Spaces  "),
            "multiple spaces"
        );
    }

    #[test]
    fn test_confidence_floor_is_reported() {
        let mut entity = Entity::new("e", "x", EntityType::Error).with_confidence(0.2);

        let change = entity.adjust_confidence(-0.13);
        assert_eq!(entity.confidence, MIN_CONFIDENCE);
        assert!(change.clamped);
        assert_eq!(change.old_confidence, 0.2);

        let change = entity.adjust_confidence(5.0);
        assert_eq!(entity.confidence, 1.0);
        assert!(change.clamped);
    }

    #[test]
    fn test_with_confidence_never_goes_below_floor() {
        let entity = Entity::new("e", "x", EntityType::Error).with_confidence(0.0);
        assert_eq!(entity.confidence, MIN_CONFIDENCE);
    }

    #[test]
    fn test_ticket_backrefs_are_deduplicated() {
        let mut entity = Entity::new("e", "x", EntityType::Equipment);
        entity.add_ticket("T-1".into());
        entity.add_ticket("T-2".into());
        entity.add_ticket("T-1".into());
        assert_eq!(entity.ticket_ids.len(), 2);
    }

    #[test]
    fn test_provenance_accumulates() {
        let mut entity = Entity::new("e", "x", EntityType::Equipment);
        entity.append_provenance("ai_extraction", Some("T-1"));
        entity.append_provenance("ai_extraction", Some("T-2"));

        let trail = entity.properties[PROVENANCE_KEY].as_array().unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1]["ticketId"], "T-2");
        assert_eq!(entity.properties[MERGE_COUNT_KEY], 2);
    }

    #[test]
    fn test_provenance_trail_is_capped() {
        let mut entity = Entity::new("e", "x", EntityType::Equipment);
        for i in 0..100 {
            entity.append_provenance("ai_extraction", Some(&format!("T-{}", i)));
        }

        let trail = entity.properties[PROVENANCE_KEY].as_array().unwrap();
        assert_eq!(trail.len(), MAX_TRAIL_ENTRIES);
        assert_eq!(trail[0]["ticketId"], format!("T-{}", 100 - MAX_TRAIL_ENTRIES));
        assert_eq!(trail[MAX_TRAIL_ENTRIES - 1]["ticketId"], "T-99");
        assert_eq!(entity.properties[MERGE_COUNT_KEY], 100);
    }

    #[test]
    fn test_matches_text() {
        let entity = Entity::new("e", "Écran bleu", EntityType::Error)
            .with_description("Blue screen of death at boot");
        assert!(entity.matches_text("écran"));
        assert!(entity.matches_text("BOOT"));
        assert!(!entity.matches_text("imprimante"));
        assert!(!entity.matches_text("   "));
    }

    #[test]
    fn test_entity_type_parsing() {
        assert_eq!(EntityType::parse("equipment"), Some(EntityType::Equipment));
        assert_eq!(EntityType::parse("OS"), Some(EntityType::Os));
        assert_eq!(EntityType::parse("manufacturer"), Some(EntityType::Brand));
        assert_eq!(EntityType::parse("unknown"), None);
        assert_eq!(EntityType::all().len(), 13);
    }

    #[test]
    fn test_serializes_type_field() {
        let entity = Entity::new("e", "Dell", EntityType::Brand);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "brand");
        assert!(json.get("ticketIds").is_some());
    }
}
