//! Analytics over a graph snapshot
//!
//! Distributions, confidence bands, influence ranking, anomaly detection,
//! growth between windows, and the insights derived from them. An empty
//! graph produces a zeroed report.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entity::EntityType;
use super::graph::{GraphState, TraversalDirection};
use super::insight::{Insight, InsightType, Severity};
use super::relation::RelationType;
use super::store::GraphStore;
use crate::config::AnalyticsConfig;

/// Shared tickets needed before an equipment/error pair counts as correlated
const CORRELATION_MIN_TICKETS: usize = 2;
/// Tickets referencing one error before it is reported as recurring
const RECURRING_ISSUE_TICKETS: usize = 3;
/// Entity ids listed per insight
const INSIGHT_ENTITY_LIMIT: usize = 10;

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AnalysisWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days ending now
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self::new(end - Duration::days(days), end)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The window of equal length immediately before this one
    pub fn prior(&self) -> Self {
        Self::new(self.start - self.duration(), self.start)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceMetrics {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub average: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluenceEntry {
    pub entity_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub degree: usize,
    pub confidence: f32,
    pub influence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub entity_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f32,
    pub severity: Severity,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthMetrics {
    pub window: AnalysisWindow,
    pub new_entities: usize,
    pub new_relations: usize,
    pub prior_entities: usize,
    pub prior_relations: usize,
    /// Percent change against the prior window; `None` when it was empty
    pub entity_growth: Option<f32>,
    pub relation_growth: Option<f32>,
}

/// Full analytics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAnalytics {
    pub generated_at: DateTime<Utc>,
    pub total_entities: usize,
    pub total_relations: usize,
    pub entity_distribution: BTreeMap<String, usize>,
    pub relation_type_distribution: BTreeMap<String, usize>,
    pub confidence_metrics: ConfidenceMetrics,
    pub top_influential: Vec<InfluenceEntry>,
    pub anomalies: Vec<Anomaly>,
    pub growth: Option<GrowthMetrics>,
    pub insights: Vec<Insight>,
}

pub struct AnalyticsEngine {
    store: Arc<GraphStore>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<GraphStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    pub async fn analyze(&self, window: Option<AnalysisWindow>) -> GraphAnalytics {
        let snapshot = self.store.snapshot().await;
        analyze(&snapshot, &self.config, window)
    }
}

/// Compute the full report from one snapshot
pub fn analyze(
    state: &GraphState,
    config: &AnalyticsConfig,
    window: Option<AnalysisWindow>,
) -> GraphAnalytics {
    let stats = state.stats();
    let anomalies = detect_anomalies(state, config);
    let growth = window.map(|w| growth_metrics(state, w));
    let insights = derive_insights(state, &anomalies, growth.as_ref());

    debug!(
        entities = stats.total_entities,
        relations = stats.total_relations,
        anomalies = anomalies.len(),
        insights = insights.len(),
        "Analytics computed"
    );

    GraphAnalytics {
        generated_at: Utc::now(),
        total_entities: stats.total_entities,
        total_relations: stats.total_relations,
        entity_distribution: stats.entities_by_type,
        relation_type_distribution: stats.relations_by_type,
        confidence_metrics: confidence_metrics(state, config),
        top_influential: influence_ranking(state, config.top_influential),
        anomalies,
        growth,
        insights,
    }
}

/// Count entities per confidence band plus the mean
///
/// High is above `high_confidence`, low is at or below
/// `medium_confidence`, medium is everything between.
pub fn confidence_metrics(state: &GraphState, config: &AnalyticsConfig) -> ConfidenceMetrics {
    let mut metrics = ConfidenceMetrics::default();
    let mut total = 0.0f64;
    let entities = state.entities();

    for entity in &entities {
        let c = entity.confidence;
        if c > config.high_confidence {
            metrics.high += 1;
        } else if c > config.medium_confidence {
            metrics.medium += 1;
        } else {
            metrics.low += 1;
        }
        total += f64::from(c);
    }
    if !entities.is_empty() {
        metrics.average = (total / entities.len() as f64) as f32;
    }
    metrics
}

/// Top `limit` entities by `degree × confidence`
///
/// Ties go to the higher confidence, then the smaller id.
pub fn influence_ranking(state: &GraphState, limit: usize) -> Vec<InfluenceEntry> {
    let mut ranking: Vec<InfluenceEntry> = state
        .entities()
        .into_iter()
        .map(|e| {
            let degree = state.degree(&e.id);
            InfluenceEntry {
                entity_id: e.id.clone(),
                name: e.name.clone(),
                entity_type: e.entity_type,
                degree,
                confidence: e.confidence,
                influence: degree as f32 * e.confidence,
            }
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.influence
            .total_cmp(&a.influence)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    ranking.truncate(limit);
    ranking
}

/// Flag low-confidence entities and isolated non-brand entities
///
/// Brands are meant to be referenced, so isolation alone never flags them.
pub fn detect_anomalies(state: &GraphState, config: &AnalyticsConfig) -> Vec<Anomaly> {
    let mut anomalies: Vec<Anomaly> = state
        .entities()
        .into_iter()
        .filter_map(|e| {
            let mut severity = None;
            let mut reasons = Vec::new();

            if e.confidence < config.anomaly_threshold {
                let level = if e.confidence < config.severe_anomaly_threshold {
                    Severity::High
                } else {
                    Severity::Medium
                };
                severity = Some(level);
                reasons.push(format!("low confidence ({:.2})", e.confidence));
            }
            if e.entity_type != EntityType::Brand && state.degree(&e.id) == 0 {
                severity = severity.max(Some(Severity::Medium));
                reasons.push("isolated entity".to_string());
            }

            severity.map(|severity| Anomaly {
                entity_id: e.id.clone(),
                name: e.name.clone(),
                entity_type: e.entity_type,
                confidence: e.confidence,
                severity,
                reasons,
            })
        })
        .collect();

    anomalies.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.confidence.total_cmp(&b.confidence))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    anomalies
}

/// Entities and relations created in `window` versus the prior window
pub fn growth_metrics(state: &GraphState, window: AnalysisWindow) -> GrowthMetrics {
    let prior = window.prior();
    let count_entities = |w: &AnalysisWindow| {
        state
            .entities()
            .iter()
            .filter(|e| w.contains(e.created_at))
            .count()
    };
    let count_relations = |w: &AnalysisWindow| {
        state
            .relations()
            .iter()
            .filter(|r| w.contains(r.created_at))
            .count()
    };

    let new_entities = count_entities(&window);
    let new_relations = count_relations(&window);
    let prior_entities = count_entities(&prior);
    let prior_relations = count_relations(&prior);

    GrowthMetrics {
        window,
        new_entities,
        new_relations,
        prior_entities,
        prior_relations,
        entity_growth: percent_change(prior_entities, new_entities),
        relation_growth: percent_change(prior_relations, new_relations),
    }
}

fn percent_change(before: usize, after: usize) -> Option<f32> {
    (before > 0).then(|| (after as f32 - before as f32) / before as f32 * 100.0)
}

fn derive_insights(
    state: &GraphState,
    anomalies: &[Anomaly],
    growth: Option<&GrowthMetrics>,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some(worst) = anomalies.first() {
        insights.push(
            Insight::new(
                InsightType::Anomaly,
                "Unreliable knowledge detected",
                format!(
                    "{} entities are low-confidence or isolated",
                    anomalies.len()
                ),
            )
            .with_confidence(0.9)
            .with_impact(worst.severity)
            .with_entities(
                anomalies
                    .iter()
                    .take(INSIGHT_ENTITY_LIMIT)
                    .map(|a| a.entity_id.clone()),
            )
            .with_recommendation("Review these entities or prune them"),
        );
    }

    for error in state.entities_of_type(EntityType::Error) {
        if error.ticket_ids.len() >= RECURRING_ISSUE_TICKETS {
            insights.push(
                Insight::new(
                    InsightType::Pattern,
                    format!("Recurring issue: {}", error.name),
                    format!("Reported in {} tickets", error.ticket_ids.len()),
                )
                .with_confidence(error.confidence)
                .with_impact(Severity::Medium)
                .with_entities([error.id.clone()])
                .with_recommendation("Write a knowledge-base article for this issue"),
            );
        }
    }

    for relation in state.relations() {
        if relation.relation_type != RelationType::HasSymptom {
            continue;
        }
        let (Some(equipment), Some(error)) = (
            state.get_entity(&relation.source_id),
            state.get_entity(&relation.target_id),
        ) else {
            continue;
        };
        let shared: BTreeSet<&String> = equipment
            .ticket_ids
            .iter()
            .filter(|t| error.ticket_ids.contains(t))
            .collect();
        if shared.len() >= CORRELATION_MIN_TICKETS {
            insights.push(
                Insight::new(
                    InsightType::Correlation,
                    format!("{} often shows {}", equipment.name, error.name),
                    format!("Seen together in {} tickets", shared.len()),
                )
                .with_confidence(relation.confidence)
                .with_impact(Severity::Low)
                .with_entities([equipment.id.clone(), error.id.clone()]),
            );
        }
    }

    let unresolved: Vec<String> = state
        .entities_of_type(EntityType::Error)
        .into_iter()
        .filter(|e| {
            state
                .neighbors_by_type(&e.id, TraversalDirection::Incoming, RelationType::Resolves)
                .is_empty()
        })
        .map(|e| e.id.clone())
        .collect();
    if !unresolved.is_empty() {
        insights.push(
            Insight::new(
                InsightType::Prediction,
                "Errors without known solutions",
                format!(
                    "{} errors have no resolving solution and will likely need escalation",
                    unresolved.len()
                ),
            )
            .with_confidence(0.6)
            .with_impact(Severity::Medium)
            .with_entities(unresolved.into_iter().take(INSIGHT_ENTITY_LIMIT))
            .with_recommendation("Capture solutions when these tickets are resolved"),
        );
    }

    if let Some(growth) = growth {
        if growth.entity_growth.is_some_and(|g| g >= 50.0) {
            insights.push(
                Insight::new(
                    InsightType::Prediction,
                    "Knowledge base growing quickly",
                    format!(
                        "{} new entities against {} in the prior window",
                        growth.new_entities, growth.prior_entities
                    ),
                )
                .with_confidence(0.7)
                .with_impact(Severity::Low),
            );
        }
    }

    insights.sort_by(|a, b| b.impact.cmp(&a.impact).then_with(|| a.title.cmp(&b.title)));
    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::entity::Entity;
    use crate::domain::knowledge::relation::Relation;

    fn config() -> AnalyticsConfig {
        AnalyticsConfig::default()
    }

    fn star(state: &mut GraphState, hub: &str, degree: usize) {
        for i in 0..degree {
            let leaf = format!("{}-leaf-{}", hub, i);
            state
                .insert_entity(Entity::new(leaf.clone(), leaf.clone(), EntityType::Symptom))
                .unwrap();
            state
                .insert_relation(Relation::new(
                    format!("{}-rel-{}", hub, i),
                    hub,
                    leaf,
                    RelationType::HasSymptom,
                ))
                .unwrap();
        }
    }

    #[test]
    fn test_influence_prefers_confidence_weighted_degree() {
        let mut state = GraphState::new();
        state
            .insert_entity(Entity::new("a", "A", EntityType::Equipment).with_confidence(0.9))
            .unwrap();
        state
            .insert_entity(Entity::new("b", "B", EntityType::Equipment).with_confidence(0.3))
            .unwrap();
        star(&mut state, "a", 3);
        star(&mut state, "b", 5);

        let ranking = influence_ranking(&state, 2);
        assert_eq!(ranking[0].entity_id, "a");
        assert!((ranking[0].influence - 2.7).abs() < 1e-5);
        assert_eq!(ranking[1].entity_id, "b");
        assert!((ranking[1].influence - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_anomaly_severity_and_brand_exemption() {
        let mut state = GraphState::new();
        state
            .insert_entity(Entity::new("m", "Medium", EntityType::Error).with_confidence(0.25))
            .unwrap();
        state
            .insert_entity(Entity::new("h", "High", EntityType::Error).with_confidence(0.15))
            .unwrap();
        state
            .insert_entity(Entity::new("brand", "Dell", EntityType::Brand))
            .unwrap();
        state
            .insert_entity(Entity::new("lonely", "Lonely", EntityType::Software))
            .unwrap();

        let anomalies = detect_anomalies(&state, &config());
        let find = |id: &str| anomalies.iter().find(|a| a.entity_id == id);

        assert_eq!(find("m").unwrap().severity, Severity::Medium);
        assert_eq!(find("h").unwrap().severity, Severity::High);
        assert!(find("brand").is_none());
        assert_eq!(find("lonely").unwrap().reasons, vec!["isolated entity"]);
        assert_eq!(anomalies[0].entity_id, "h");
    }

    #[test]
    fn test_confidence_bands() {
        let mut state = GraphState::new();
        for (id, c) in [("a", 0.9), ("b", 0.8), ("c", 0.6), ("d", 0.5), ("e", 0.2)] {
            state
                .insert_entity(Entity::new(id, id, EntityType::Error).with_confidence(c))
                .unwrap();
        }

        let metrics = confidence_metrics(&state, &config());
        assert_eq!((metrics.high, metrics.medium, metrics.low), (1, 2, 2));
        assert!((metrics.average - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_growth_against_prior_window() {
        let now = Utc::now();
        let mut state = GraphState::new();
        state
            .insert_entity(Entity::new("old", "Old", EntityType::Error).with_created_at(now - Duration::days(10)))
            .unwrap();
        for id in ["n1", "n2"] {
            state
                .insert_entity(Entity::new(id, id, EntityType::Error).with_created_at(now - Duration::days(1)))
                .unwrap();
        }

        let window = AnalysisWindow::new(now - Duration::days(7), now + Duration::seconds(1));
        let growth = growth_metrics(&state, window);
        assert_eq!((growth.new_entities, growth.prior_entities), (2, 1));
        assert!((growth.entity_growth.unwrap() - 100.0).abs() < 1e-3);
        assert_eq!(growth.relation_growth, None);
    }

    #[test]
    fn test_empty_graph_report_is_zeroed() {
        let report = analyze(&GraphState::new(), &config(), Some(AnalysisWindow::last_days(7)));
        assert_eq!(report.total_entities, 0);
        assert_eq!(report.confidence_metrics, ConfidenceMetrics::default());
        assert!(report.top_influential.is_empty());
        assert!(report.anomalies.is_empty());
        assert!(report.insights.is_empty());
    }

    #[test]
    fn test_insights_from_tickets() {
        let mut state = GraphState::new();
        let mut printer = Entity::new("eq", "HP LaserJet", EntityType::Equipment);
        let mut jam = Entity::new("err", "Bourrage", EntityType::Error);
        for ticket in ["T-1", "T-2", "T-3"] {
            printer.add_ticket(ticket.to_string());
            jam.add_ticket(ticket.to_string());
        }
        state.insert_entity(printer).unwrap();
        state.insert_entity(jam).unwrap();
        state
            .insert_relation(Relation::new("r", "eq", "err", RelationType::HasSymptom))
            .unwrap();

        let report = analyze(&state, &config(), None);
        let kinds: Vec<InsightType> = report.insights.iter().map(|i| i.insight_type).collect();
        assert!(kinds.contains(&InsightType::Pattern));
        assert!(kinds.contains(&InsightType::Correlation));
        assert!(kinds.contains(&InsightType::Prediction));
    }
}
