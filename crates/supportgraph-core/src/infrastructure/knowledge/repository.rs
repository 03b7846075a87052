//! SQLite implementation of the GraphRepository
//!
//! Each change set is written inside one SQL transaction. Properties, ticket
//! ids and feedback context are stored as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::domain::knowledge::{
    ChangeSet, Entity, EntityType, FeedbackRecord, FeedbackTarget, GraphRepository, GraphState,
    Properties, Relation, RelationType, Sentiment,
};
use crate::error::{Error, Result};

/// SQLite-backed graph repository
#[derive(Clone)]
pub struct SqliteGraphRepository {
    pool: SqlitePool,
}

impl SqliteGraphRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert_entity(tx: &mut Transaction<'_, Sqlite>, entity: &Entity) -> Result<()> {
        let properties = to_json(&entity.properties, "properties")?;
        let ticket_ids = to_json(&entity.ticket_ids, "ticket_ids")?;

        sqlx::query(
            r#"
            INSERT INTO kg_entities (
                id, entity_type, name, canonical_name, description,
                properties, confidence, ticket_ids, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                entity_type = excluded.entity_type,
                name = excluded.name,
                canonical_name = excluded.canonical_name,
                description = excluded.description,
                properties = excluded.properties,
                confidence = excluded.confidence,
                ticket_ids = excluded.ticket_ids,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entity.id)
        .bind(entity.entity_type.as_str())
        .bind(&entity.name)
        .bind(&entity.canonical_name)
        .bind(&entity.description)
        .bind(&properties)
        .bind(entity.confidence)
        .bind(&ticket_ids)
        .bind(entity.created_at.to_rfc3339())
        .bind(entity.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_relation(tx: &mut Transaction<'_, Sqlite>, relation: &Relation) -> Result<()> {
        let properties = to_json(&relation.properties, "properties")?;

        sqlx::query(
            r#"
            INSERT INTO kg_relations (
                id, source_id, target_id, relation_type, weight,
                confidence, properties, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                target_id = excluded.target_id,
                relation_type = excluded.relation_type,
                weight = excluded.weight,
                confidence = excluded.confidence,
                properties = excluded.properties,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&relation.id)
        .bind(&relation.source_id)
        .bind(&relation.target_id)
        .bind(relation.relation_type.as_str())
        .bind(relation.weight)
        .bind(relation.confidence)
        .bind(&properties)
        .bind(relation.created_at.to_rfc3339())
        .bind(relation.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_feedback(
        tx: &mut Transaction<'_, Sqlite>,
        record: &FeedbackRecord,
    ) -> Result<()> {
        let context = to_json(&record.context, "context")?;

        sqlx::query(
            r#"
            INSERT INTO kg_feedback (
                id, target_type, target_id, rating, sentiment, comments,
                context, user_id, timestamp, processed, idempotency_key
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                processed = excluded.processed
            "#,
        )
        .bind(&record.id)
        .bind(record.target_type.as_str())
        .bind(&record.target_id)
        .bind(i64::from(record.rating))
        .bind(record.sentiment.as_str())
        .bind(&record.comments)
        .bind(&context)
        .bind(&record.user_id)
        .bind(record.timestamp.to_rfc3339())
        .bind(record.processed)
        .bind(&record.idempotency_key)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load_graph(&self) -> Result<GraphState> {
        let entities: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, entity_type, name, canonical_name, description,
                   properties, confidence, ticket_ids, created_at, updated_at
            FROM kg_entities
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let relations: Vec<RelationRow> = sqlx::query_as(
            r#"
            SELECT id, source_id, target_id, relation_type, weight,
                   confidence, properties, created_at, updated_at
            FROM kg_relations
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let feedback: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT id, target_type, target_id, rating, sentiment, comments,
                   context, user_id, timestamp, processed, idempotency_key
            FROM kg_feedback
            ORDER BY timestamp, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(
            entities = entities.len(),
            relations = relations.len(),
            feedback = feedback.len(),
            "Loaded knowledge graph rows"
        );

        GraphState::from_parts(
            entities
                .into_iter()
                .map(EntityRow::into_entity)
                .collect::<Result<_>>()?,
            relations
                .into_iter()
                .map(RelationRow::into_relation)
                .collect::<Result<_>>()?,
            feedback
                .into_iter()
                .map(FeedbackRow::into_record)
                .collect::<Result<_>>()?,
        )
    }

    async fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for id in &changes.deleted_relations {
            sqlx::query("DELETE FROM kg_relations WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        for id in &changes.deleted_entities {
            sqlx::query("DELETE FROM kg_entities WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        for entity in &changes.upserted_entities {
            Self::upsert_entity(&mut tx, entity).await?;
        }
        for relation in &changes.upserted_relations {
            Self::upsert_relation(&mut tx, relation).await?;
        }
        for record in &changes.recorded_feedback {
            Self::upsert_feedback(&mut tx, record).await?;
        }

        tx.commit().await?;

        debug!(
            upserted_entities = changes.upserted_entities.len(),
            upserted_relations = changes.upserted_relations.len(),
            deleted_entities = changes.deleted_entities.len(),
            deleted_relations = changes.deleted_relations.len(),
            feedback = changes.recorded_feedback.len(),
            "Change set persisted"
        );
        Ok(())
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T, field: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Other(format!("Failed to serialize {}: {}", field, e)))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_properties(raw: &str) -> Properties {
    serde_json::from_str(raw).unwrap_or_default()
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    entity_type: String,
    name: String,
    canonical_name: String,
    description: String,
    properties: String,
    confidence: f32,
    ticket_ids: String,
    created_at: String,
    updated_at: String,
}

impl EntityRow {
    fn into_entity(self) -> Result<Entity> {
        let entity_type = EntityType::parse(&self.entity_type)
            .ok_or_else(|| Error::Other(format!("Invalid entity type: {}", self.entity_type)))?;

        Ok(Entity {
            id: self.id,
            entity_type,
            name: self.name,
            canonical_name: self.canonical_name,
            description: self.description,
            properties: parse_properties(&self.properties),
            confidence: self.confidence,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            ticket_ids: serde_json::from_str(&self.ticket_ids).unwrap_or_default(),
        })
    }
}

#[derive(Debug, FromRow)]
struct RelationRow {
    id: String,
    source_id: String,
    target_id: String,
    relation_type: String,
    weight: f32,
    confidence: f32,
    properties: String,
    created_at: String,
    updated_at: String,
}

impl RelationRow {
    fn into_relation(self) -> Result<Relation> {
        let relation_type = RelationType::parse(&self.relation_type).ok_or_else(|| {
            Error::Other(format!("Invalid relation type: {}", self.relation_type))
        })?;

        Ok(Relation {
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            relation_type,
            weight: self.weight,
            confidence: self.confidence,
            properties: parse_properties(&self.properties),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct FeedbackRow {
    id: String,
    target_type: String,
    target_id: String,
    rating: i64,
    sentiment: String,
    comments: String,
    context: String,
    user_id: Option<String>,
    timestamp: String,
    processed: bool,
    idempotency_key: Option<String>,
}

impl FeedbackRow {
    fn into_record(self) -> Result<FeedbackRecord> {
        let target_type = FeedbackTarget::parse(&self.target_type).ok_or_else(|| {
            Error::Other(format!("Invalid feedback target: {}", self.target_type))
        })?;
        let rating = u8::try_from(self.rating)
            .map_err(|_| Error::Other(format!("Invalid feedback rating: {}", self.rating)))?;

        Ok(FeedbackRecord {
            id: self.id,
            target_type,
            target_id: self.target_id,
            rating,
            sentiment: Sentiment::parse(&self.sentiment).unwrap_or_default(),
            comments: self.comments,
            context: serde_json::from_str(&self.context).unwrap_or_default(),
            user_id: self.user_id,
            timestamp: parse_timestamp(&self.timestamp),
            processed: self.processed,
            idempotency_key: self.idempotency_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn repo() -> (Database, SqliteGraphRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteGraphRepository::new(db.pool().clone());
        (db, repo)
    }

    fn sample_changes() -> ChangeSet {
        let mut laptop = Entity::new("eq-1", "Dell Latitude 5520", EntityType::Equipment);
        laptop
            .properties
            .insert("model".into(), serde_json::json!("Latitude 5520"));
        laptop.ticket_ids.push("T-1".into());

        ChangeSet {
            upserted_entities: vec![
                Entity::new("br-1", "Dell", EntityType::Brand).with_confidence(0.9),
                laptop,
            ],
            upserted_relations: vec![
                Relation::new("rel-1", "eq-1", "br-1", RelationType::ManufacturedBy)
                    .with_weight(0.9)
                    .with_confidence(0.85),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let (_db, repo) = repo().await;
        repo.apply_changes(&sample_changes()).await.unwrap();

        let state = repo.load_graph().await.unwrap();
        assert_eq!(state.entity_count(), 2);
        assert_eq!(state.relation_count(), 1);

        let laptop = state.get_entity("eq-1").unwrap();
        assert_eq!(laptop.entity_type, EntityType::Equipment);
        assert_eq!(laptop.properties["model"], "Latitude 5520");
        assert_eq!(laptop.ticket_ids, vec!["T-1".to_string()]);

        let relation = state.get_relation("rel-1").unwrap();
        assert_eq!(relation.relation_type, RelationType::ManufacturedBy);
        assert!((relation.confidence - 0.85).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_upsert_does_not_drop_relations() {
        let (_db, repo) = repo().await;
        repo.apply_changes(&sample_changes()).await.unwrap();

        let brand = Entity::new("br-1", "Dell", EntityType::Brand).with_confidence(0.4);
        repo.apply_changes(&ChangeSet {
            upserted_entities: vec![brand],
            ..Default::default()
        })
        .await
        .unwrap();

        let state = repo.load_graph().await.unwrap();
        assert!((state.get_entity("br-1").unwrap().confidence - 0.4).abs() < 1e-6);
        assert_eq!(state.relation_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_change_set_is_rolled_back() {
        let (_db, repo) = repo().await;
        repo.apply_changes(&sample_changes()).await.unwrap();

        let changes = ChangeSet {
            upserted_entities: vec![Entity::new("sym-1", "Écran noir", EntityType::Symptom)],
            upserted_relations: vec![Relation::new(
                "rel-2",
                "eq-1",
                "missing",
                RelationType::HasSymptom,
            )],
            ..Default::default()
        };
        let err = repo.apply_changes(&changes).await.unwrap_err();
        assert!(matches!(err, Error::DatabaseError(_)));

        let state = repo.load_graph().await.unwrap();
        assert!(state.get_entity("sym-1").is_none());
        assert_eq!(state.entity_count(), 2);
    }

    #[tokio::test]
    async fn test_deletes_and_feedback() {
        let (_db, repo) = repo().await;
        repo.apply_changes(&sample_changes()).await.unwrap();

        let mut record = FeedbackRecord::new(FeedbackTarget::Entity, "eq-1", 4);
        record.id = "fb-1".into();
        record.sentiment = Sentiment::Positive;
        record.processed = true;
        record.idempotency_key = Some("key-1".into());

        repo.apply_changes(&ChangeSet {
            deleted_relations: vec!["rel-1".into()],
            deleted_entities: vec!["br-1".into()],
            recorded_feedback: vec![record],
            ..Default::default()
        })
        .await
        .unwrap();

        let state = repo.load_graph().await.unwrap();
        assert_eq!(state.entity_count(), 1);
        assert_eq!(state.relation_count(), 0);
        let stored = state.get_feedback("fb-1").unwrap();
        assert_eq!(stored.rating, 4);
        assert_eq!(stored.sentiment, Sentiment::Positive);
        assert!(stored.processed);
        assert_eq!(stored.idempotency_key.as_deref(), Some("key-1"));
    }
}
