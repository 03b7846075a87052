//! Config module tests

use crate::config::{CONFIG_KEYS, CollaboratorKind, Config, StorageBackend};

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(config.llm.api_key.is_none());
    assert_eq!(config.llm.timeout_secs, 30);
    assert_eq!(config.ingestion.collaborator, CollaboratorKind::Auto);
    assert!(config.ingestion.retry_on_transient);
    assert_eq!(config.learner.rating_boost, 0.05);
    assert_eq!(config.learner.rating_penalty, 0.08);
    assert_eq!(config.learner.positive_sentiment_boost, 0.03);
    assert_eq!(config.learner.negative_sentiment_penalty, 0.05);
    assert_eq!(config.analytics.anomaly_threshold, 0.3);
    assert_eq!(config.analytics.severe_anomaly_threshold, 0.2);
    assert_eq!(config.layout.repulsion_distance, 200.0);
    assert_eq!(config.layout.damping, 0.9);
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let config: Config = toml::from_str(
        r#"
        [analytics]
        anomaly_threshold = 0.4

        [layout]
        width = 640.0
        "#,
    )
    .unwrap();

    assert_eq!(config.analytics.anomaly_threshold, 0.4);
    assert_eq!(config.analytics.severe_anomaly_threshold, 0.2);
    assert_eq!(config.layout.width, 640.0);
    assert_eq!(config.layout.height, 800.0);
    assert_eq!(config.diagnosis.max_causes, 5);
}

#[test]
fn test_toml_round_trip_never_writes_api_key() {
    let mut config = Config::default();
    config.set("learner.idempotent", "false").unwrap();
    let text = toml::to_string_pretty(&config).unwrap();

    assert!(!text.contains("api_key"));
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_set_and_get() {
    let mut config = Config::default();

    config.set("ingestion.collaborator", "heuristic").unwrap();
    assert_eq!(config.get("ingestion.collaborator").unwrap(), "heuristic");

    config.set("llm.fallback_models", "a/one, b/two,").unwrap();
    assert_eq!(config.llm.fallback_models, vec!["a/one", "b/two"]);

    config.set("storage.backend", "memory").unwrap();
    assert_eq!(config.storage.backend, StorageBackend::Memory);

    config.set("layout.tick_interval_ms", "33").unwrap();
    assert_eq!(config.layout.tick_interval_ms, 33);
}

#[test]
fn test_set_rejects_invalid_values() {
    let mut config = Config::default();

    assert!(config.set("llm.temperature", "3.5").is_err());
    assert!(config.set("learner.rating_boost", "abc").is_err());
    assert!(config.set("diagnosis.max_causes", "0").is_err());
    assert!(config.set("ingestion.collaborator", "oracle").is_err());
    assert!(config.set("llm.api_key", "sk-secret").is_err());
    assert!(config.set("no.such.key", "1").is_err());
}

#[test]
fn test_threshold_ordering_is_validated() {
    let mut config = Config::default();
    assert!(config.set("analytics.severe_anomaly_threshold", "0.5").is_err());
}

#[test]
fn test_stored_api_key_is_rejected() {
    let mut config = Config::default();
    config.llm.api_key = Some("sk-stored".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_list_covers_every_key() {
    let mut config = Config::default();
    config.storage.database_path = Some("/tmp/graph.db".into());
    let listed = config.list().unwrap();

    assert_eq!(listed.len(), CONFIG_KEYS.len());
    assert!(listed
        .iter()
        .any(|(k, v)| k == "storage.database_path" && v == "/tmp/graph.db"));
}
