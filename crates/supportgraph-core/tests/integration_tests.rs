//! Supportgraph Core Integration Tests

use std::sync::Arc;

use supportgraph_core::config::{AnalyticsConfig, Config, LayoutConfig, LearnerConfig};
use supportgraph_core::domain::knowledge::{
    AnalyticsEngine, DiagnosisEngine, DiagnosisRequest, Entity, EntityType, FeedbackRecord,
    FeedbackTarget, GraphState, GraphStore, HeuristicExtractionCollaborator, IngestionPipeline,
    LayoutState, Learner, Relation, RelationType, Sentiment, Severity, TicketInput,
    detect_anomalies, influence_ranking, simulate,
};
use supportgraph_core::infrastructure::knowledge::SqliteGraphRepository;
use supportgraph_core::storage::Database;
use supportgraph_core::{Error, Result};

fn feedback(target: &str, rating: u8, sentiment: Sentiment) -> FeedbackRecord {
    let mut record = FeedbackRecord::new(FeedbackTarget::Entity, target, rating);
    record.sentiment = sentiment;
    record
}

async fn seeded_store(entities: Vec<Entity>, relations: Vec<Relation>) -> Arc<GraphStore> {
    let store = Arc::new(GraphStore::in_memory());
    store
        .transact(|tx| {
            for entity in entities {
                tx.add_entity(entity)?;
            }
            for relation in relations {
                tx.add_relation(relation)?;
            }
            Ok(())
        })
        .await
        .unwrap();
    store
}

async fn confidences(store: &GraphStore) -> Vec<f32> {
    store
        .snapshot()
        .await
        .entities()
        .iter()
        .map(|e| e.confidence)
        .collect()
}

#[tokio::test]
async fn test_confidence_stays_in_range_after_any_mutation() {
    let store = seeded_store(
        vec![
            Entity::new("a", "Dell", EntityType::Brand).with_confidence(5.0),
            Entity::new("b", "Latitude", EntityType::Equipment).with_confidence(-2.0),
        ],
        vec![],
    )
    .await;
    let learner = Learner::new(store.clone(), LearnerConfig::default());

    for _ in 0..10 {
        learner.submit_feedback(feedback("a", 5, Sentiment::Positive)).await.unwrap();
        learner.submit_feedback(feedback("b", 1, Sentiment::Negative)).await.unwrap();
    }

    for c in confidences(&store).await {
        assert!((0.1..=1.0).contains(&c), "confidence {} out of range", c);
    }
}

#[tokio::test]
async fn test_add_relation_with_unknown_endpoint_leaves_store_unchanged() {
    let store = seeded_store(vec![Entity::new("a", "Dell", EntityType::Brand)], vec![]).await;
    let before = store.snapshot().await;

    let err = store
        .add_relation(Relation::new("r", "a", "missing", RelationType::ManufacturedBy))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEntity { .. }));

    let err = store
        .add_relation(Relation::new("r", "missing", "a", RelationType::ManufacturedBy))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEntity { .. }));

    let after = store.snapshot().await;
    assert_eq!(before.relation_count(), after.relation_count());
    assert_eq!(before.entity_count(), after.entity_count());
}

#[tokio::test]
async fn test_positive_feedback_reaches_expected_confidence() {
    let store = seeded_store(
        vec![Entity::new("s", "Réinstaller le pilote", EntityType::Solution).with_confidence(0.90)],
        vec![],
    )
    .await;
    let learner = Learner::new(store.clone(), LearnerConfig::default());

    let outcome = learner
        .submit_feedback(feedback("s", 5, Sentiment::Positive))
        .await
        .unwrap();
    let new = outcome.update_result.new_confidence.unwrap();
    assert!((new - 0.98).abs() < 1e-5);
}

#[tokio::test]
async fn test_negative_feedback_clamps_at_floor() {
    let store = seeded_store(
        vec![Entity::new("s", "Redémarrer", EntityType::Solution).with_confidence(0.20)],
        vec![],
    )
    .await;
    let learner = Learner::new(store.clone(), LearnerConfig::default());

    let outcome = learner
        .submit_feedback(feedback("s", 1, Sentiment::Negative))
        .await
        .unwrap();
    assert_eq!(outcome.update_result.new_confidence, Some(0.1));
    assert!(outcome.update_result.clamped);
}

#[tokio::test]
async fn test_influence_prefers_confident_hub() {
    let mut entities = vec![
        Entity::new("a", "Écran bleu", EntityType::Error).with_confidence(0.9),
        Entity::new("b", "Lenteur", EntityType::Symptom).with_confidence(0.3),
    ];
    for i in 0..5 {
        entities.push(Entity::new(format!("n{}", i), format!("Poste {}", i), EntityType::Equipment));
    }
    let mut relations = Vec::new();
    for i in 0..3 {
        relations.push(Relation::new(format!("ra{}", i), format!("n{}", i), "a", RelationType::HasSymptom));
    }
    for i in 0..5 {
        relations.push(Relation::new(format!("rb{}", i), format!("n{}", i), "b", RelationType::HasSymptom));
    }
    let store = seeded_store(entities, relations).await;

    let ranking = influence_ranking(&*store.snapshot().await, 10);
    let pos = |id: &str| ranking.iter().position(|e| e.entity_id == id).unwrap();
    assert!(pos("a") < pos("b"));
    assert!((ranking[pos("a")].influence - 2.7).abs() < 1e-4);
    assert!((ranking[pos("b")].influence - 1.5).abs() < 1e-4);
}

#[tokio::test]
async fn test_anomaly_severity_rules() {
    let store = seeded_store(
        vec![
            Entity::new("eq", "Poste accueil", EntityType::Equipment).with_confidence(0.8),
            Entity::new("medium", "Bruit ventilateur", EntityType::Symptom).with_confidence(0.25),
            Entity::new("high", "Clignotement", EntityType::Symptom).with_confidence(0.15),
            Entity::new("brand", "Acme", EntityType::Brand),
        ],
        vec![
            Relation::new("r1", "eq", "medium", RelationType::HasSymptom),
            Relation::new("r2", "eq", "high", RelationType::HasSymptom),
        ],
    )
    .await;

    let anomalies = detect_anomalies(&*store.snapshot().await, &AnalyticsConfig::default());
    let severity = |id: &str| anomalies.iter().find(|a| a.entity_id == id).map(|a| a.severity);
    assert_eq!(severity("medium"), Some(Severity::Medium));
    assert_eq!(severity("high"), Some(Severity::High));
    assert_eq!(severity("brand"), None);
}

#[tokio::test]
async fn test_layout_stays_on_canvas_after_500_ticks() {
    let mut entities = Vec::new();
    let mut relations = Vec::new();
    for i in 0..25 {
        entities.push(Entity::new(format!("e{:02}", i), format!("Entité {}", i), EntityType::Equipment));
        if i > 0 {
            relations.push(Relation::new(
                format!("r{:02}", i),
                format!("e{:02}", i - 1),
                format!("e{:02}", i),
                RelationType::RelatedTo,
            ));
        }
    }
    let store = seeded_store(entities, relations).await;
    let config = LayoutConfig::default();

    let initial = LayoutState::from_graph(&*store.snapshot().await, &[], &config);
    let settled = simulate(&initial, &config, 500);
    assert_eq!(settled.nodes.len(), 25);
    assert!(settled.is_within_bounds());

    let again = simulate(&initial, &config, 500);
    assert_eq!(settled, again);
}

#[tokio::test]
async fn test_diagnosis_is_deterministic() {
    let store = seeded_store(
        vec![
            Entity::new("e1", "écran bleu", EntityType::Error),
            Entity::new("e2", "écran noir", EntityType::Error),
            Entity::new("e3", "écran figé", EntityType::Symptom),
        ],
        vec![],
    )
    .await;
    let engine = DiagnosisEngine::new(store, Config::default().diagnosis);
    let request = DiagnosisRequest::new(["écran"]);

    let first = engine.diagnose(&request).await.unwrap();
    for _ in 0..5 {
        let next = engine.diagnose(&request).await.unwrap();
        assert_eq!(first.possible_causes, next.possible_causes);
    }
}

#[tokio::test]
async fn test_empty_graph_yields_empty_results() {
    let store = Arc::new(GraphStore::in_memory());
    let analytics = AnalyticsEngine::new(store.clone(), AnalyticsConfig::default())
        .analyze(None)
        .await;
    assert_eq!(analytics.total_entities, 0);
    assert!(analytics.anomalies.is_empty());

    let diagnosis = DiagnosisEngine::new(store, Config::default().diagnosis)
        .diagnose(&DiagnosisRequest::new(["imprimante"]))
        .await
        .unwrap();
    assert!(diagnosis.primary_issue.is_none());
    assert!(diagnosis.possible_causes.is_empty());
}

fn assert_ticket_graph(state: &GraphState) {
    let equipment = state
        .entities_of_type(EntityType::Equipment)
        .into_iter()
        .find(|e| e.name.contains("Dell Latitude"))
        .expect("equipment entity");
    let brand = state
        .find_by_canonical_name("Dell", EntityType::Brand)
        .expect("brand entity");
    assert!(state
        .relation_between(&brand.id, &equipment.id, RelationType::ManufacturedBy)
        .is_some());
    assert!(state
        .entities_of_type(EntityType::Error)
        .iter()
        .any(|e| e.name.to_lowercase().contains("écran bleu")));
}

#[tokio::test]
async fn test_ticket_to_diagnosis_end_to_end() -> Result<()> {
    let store = Arc::new(GraphStore::in_memory());
    let config = Config::default();
    let pipeline = IngestionPipeline::new(
        store.clone(),
        Arc::new(HeuristicExtractionCollaborator::new()),
        config.ingestion.clone(),
    );

    pipeline
        .enrich_ticket(&TicketInput::new("T-100", "Écran bleu au démarrage, Dell Latitude"))
        .await?;
    assert_ticket_graph(&*store.snapshot().await);

    let result = DiagnosisEngine::new(store.clone(), config.diagnosis.clone())
        .diagnose(&DiagnosisRequest::new(["écran bleu"]))
        .await?;
    let primary = result.primary_issue.expect("primary issue");
    assert_eq!(primary.entity_type, EntityType::Error);
    assert_eq!(primary.name.to_lowercase(), "écran bleu");
    Ok(())
}

#[tokio::test]
async fn test_sqlite_backed_store_persists_enrichment() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("graph.db");
    let open = || async {
        let db = Database::open(&path).await?;
        GraphStore::open(
            Arc::new(SqliteGraphRepository::new(db.pool().clone())),
            Arc::new(supportgraph_core::domain::knowledge::UuidIdGenerator),
        )
        .await
    };

    let store = Arc::new(open().await?);
    IngestionPipeline::new(
        store.clone(),
        Arc::new(HeuristicExtractionCollaborator::new()),
        Config::default().ingestion,
    )
    .enrich_ticket(&TicketInput::new("T-200", "Écran bleu au démarrage, Dell Latitude"))
    .await?;
    drop(store);

    let reopened = open().await?;
    assert_ticket_graph(&*reopened.snapshot().await);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_cumulative_feedback_without_idempotency() -> Result<()> {
    let db = Database::in_memory().await?;
    let repository = Arc::new(SqliteGraphRepository::new(db.pool().clone()));
    let store = Arc::new(
        GraphStore::open(
            repository.clone(),
            Arc::new(supportgraph_core::domain::knowledge::SequentialIdGenerator::default()),
        )
        .await?,
    );
    store
        .add_entity(Entity::new("err", "Écran bleu", EntityType::Error).with_confidence(0.5))
        .await?;

    let learner = Learner::new(
        store.clone(),
        LearnerConfig {
            idempotent: false,
            ..LearnerConfig::default()
        },
    );
    let record = FeedbackRecord::new(FeedbackTarget::Entity, "err", 5).with_idempotency_key("k-1");
    learner.submit_feedback(record.clone()).await?;
    learner.submit_feedback(record).await?;

    let confidence = store.get_entity("err").await.map(|e| e.confidence);
    assert!((confidence.unwrap() - 0.6).abs() < 1e-5);

    let persisted = GraphStore::open(
        repository,
        Arc::new(supportgraph_core::domain::knowledge::SequentialIdGenerator::default()),
    )
    .await?;
    assert!((persisted.get_entity("err").await.unwrap().confidence - 0.6).abs() < 1e-5);
    Ok(())
}
