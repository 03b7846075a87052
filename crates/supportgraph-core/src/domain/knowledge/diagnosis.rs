//! Diagnosis: rank causes and solutions for a set of symptoms
//!
//! Runs entirely on a graph snapshot. Identical input against an identical
//! snapshot always yields the same ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entity::{Entity, EntityType};
use super::graph::{GraphState, TraversalDirection};
use super::insight::Severity;
use super::relation::RelationType;
use super::store::GraphStore;
use super::ticket::Urgency;
use crate::config::DiagnosisConfig;
use crate::error::{Error, Result};

/// Strength multiplier for keywords found only in a description
const DESCRIPTION_MATCH_FACTOR: f32 = 0.5;

const CRITICAL_KEYWORDS: &[&str] = &[
    "perte de données",
    "data loss",
    "fumée",
    "smoke",
    "panne totale",
    "ransomware",
    "piratage",
    "security breach",
];

const HIGH_KEYWORDS: &[&str] = &[
    "écran bleu",
    "blue screen",
    "bloqué",
    "blocked",
    "impossible",
    "cannot",
    "crash",
    "ne démarre pas",
    "won't boot",
];

const CRITICAL_EQUIPMENT: &[&str] = &["serveur", "server", "routeur", "router", "switch", "firewall", "nas"];

/// Context supplied with a diagnosis request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisContext {
    #[serde(default)]
    pub urgency: Option<Urgency>,
}

/// A prior case used for similarity matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub id: String,
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub resolution_time_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRequest {
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub context: DiagnosisContext,
    #[serde(default)]
    pub history: Vec<CaseRecord>,
}

impl DiagnosisRequest {
    pub fn new<S: Into<String>>(symptoms: impl IntoIterator<Item = S>) -> Self {
        Self {
            symptoms: symptoms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_equipment(mut self, equipment: impl Into<String>) -> Self {
        self.equipment = Some(equipment.into());
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.context.urgency = Some(urgency);
        self
    }

    pub fn with_history(mut self, history: Vec<CaseRecord>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PossibleCause {
    pub entity_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub probability: f32,
    pub match_strength: f32,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedSolution {
    pub solution_id: String,
    pub name: String,
    pub description: String,
    /// Cause this solution resolves
    pub cause_id: String,
    pub estimated_success: f32,
    pub success_rate: Option<f64>,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub urgency: Urgency,
    pub impact: Severity,
    pub risk_level: Severity,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedCase {
    pub case_id: String,
    pub diagnosis: String,
    pub overlap: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub primary_issue: Option<PossibleCause>,
    pub confidence: f32,
    pub possible_causes: Vec<PossibleCause>,
    pub recommended_solutions: Vec<RecommendedSolution>,
    pub related_cases: Vec<RelatedCase>,
    pub risk_assessment: RiskAssessment,
    /// Minutes
    pub estimated_resolution_time: u32,
    pub preventive_measures: Vec<String>,
    pub next_steps: Vec<String>,
}

/// Read-only diagnosis over the shared store
pub struct DiagnosisEngine {
    store: Arc<GraphStore>,
    config: DiagnosisConfig,
}

impl DiagnosisEngine {
    pub fn new(store: Arc<GraphStore>, config: DiagnosisConfig) -> Self {
        Self { store, config }
    }

    pub async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult> {
        let snapshot = self.store.snapshot().await;
        diagnose(&snapshot, request, &self.config)
    }

    /// Cause ranking only, for interactive hints
    pub async fn quick_suggestions(
        &self,
        query: &str,
        equipment: Option<&str>,
    ) -> Vec<PossibleCause> {
        let snapshot = self.store.snapshot().await;
        quick_suggestions(&snapshot, query, equipment, self.config.quick_suggestion_limit)
    }
}

/// How strongly a keyword matches an entity, in `[0, 1]`
///
/// A keyword inside the name scores its share of the name; a name inside
/// the keyword scores the name's share of the keyword. Description-only
/// matches score at half strength.
pub fn match_strength(keyword: &str, entity: &Entity) -> f32 {
    let keyword = keyword.trim().to_lowercase();
    let name = entity.name.trim().to_lowercase();
    if keyword.is_empty() || name.is_empty() {
        return 0.0;
    }
    let keyword_len = keyword.chars().count() as f32;
    let name_len = name.chars().count() as f32;

    if name.contains(&keyword) {
        keyword_len / name_len
    } else if keyword.contains(&name) {
        name_len / keyword_len
    } else if entity.description.to_lowercase().contains(&keyword) {
        DESCRIPTION_MATCH_FACTOR * (keyword_len / name_len).min(1.0)
    } else {
        0.0
    }
}

/// Rank error and symptom entities against the keywords
///
/// `probability = confidence × best match strength`, descending, ties by id.
pub fn rank_causes(
    state: &GraphState,
    symptoms: &[String],
    equipment: Option<&str>,
) -> Vec<PossibleCause> {
    let keywords: Vec<&str> = symptoms
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }
    let equipment = equipment.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());

    let mut causes: Vec<PossibleCause> = state
        .entities()
        .into_iter()
        .filter(|e| e.entity_type.is_cause())
        .filter_map(|entity| {
            let mut strength = 0.0f32;
            let mut evidence = Vec::new();
            for keyword in &keywords {
                let s = match_strength(keyword, entity);
                if s > 0.0 {
                    evidence.push(format!("matches symptom '{}' ({:.2})", keyword, s));
                    strength = strength.max(s);
                }
            }
            if strength == 0.0 {
                return None;
            }

            if let Some(hint) = &equipment {
                for n in state.neighbors_by_type(&entity.id, TraversalDirection::Incoming, RelationType::HasSymptom) {
                    if n.entity.name.to_lowercase().contains(hint.as_str()) {
                        evidence.push(format!("observed on {}", n.entity.name));
                    }
                }
            }
            let solutions = state
                .neighbors_by_type(&entity.id, TraversalDirection::Incoming, RelationType::Resolves)
                .len();
            if solutions > 0 {
                evidence.push(format!("{} known solution(s)", solutions));
            }

            Some(PossibleCause {
                entity_id: entity.id.clone(),
                name: entity.name.clone(),
                entity_type: entity.entity_type,
                probability: entity.confidence * strength,
                match_strength: strength,
                evidence,
            })
        })
        .collect();

    causes.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    causes
}

/// Steps 1-2 of a diagnosis over a single free-text query
pub fn quick_suggestions(
    state: &GraphState,
    query: &str,
    equipment: Option<&str>,
    limit: usize,
) -> Vec<PossibleCause> {
    let mut causes = rank_causes(state, &[query.to_string()], equipment);
    causes.truncate(limit);
    causes
}

/// Full diagnosis against a snapshot
pub fn diagnose(
    state: &GraphState,
    request: &DiagnosisRequest,
    config: &DiagnosisConfig,
) -> Result<DiagnosisResult> {
    if request.symptoms.iter().all(|s| s.trim().is_empty()) {
        return Err(Error::InvalidInput("at least one symptom is required".into()));
    }

    let mut causes = rank_causes(state, &request.symptoms, request.equipment.as_deref());
    causes.truncate(config.max_causes);
    let solutions = collect_solutions(state, &causes, config.max_solutions);
    let risk = assess_risk(state, request, causes.first());
    let related_cases = related_cases(&request.symptoms, &request.history, config.max_related_cases);
    let estimated_resolution_time = estimate_resolution_time(&related_cases, &request.history, risk.risk_level);
    let preventive_measures = preventive_measures(state, &causes, &risk);
    let next_steps = next_steps(causes.first(), solutions.first(), &risk);

    debug!(
        symptoms = request.symptoms.len(),
        causes = causes.len(),
        solutions = solutions.len(),
        risk = %risk.risk_level,
        "Diagnosis computed"
    );

    Ok(DiagnosisResult {
        confidence: causes.first().map_or(0.0, |c| c.probability),
        primary_issue: causes.first().cloned(),
        possible_causes: causes,
        recommended_solutions: solutions,
        related_cases,
        risk_assessment: risk,
        estimated_resolution_time,
        preventive_measures,
        next_steps,
    })
}

/// Solutions reached backwards over `resolves`, best estimate first
fn collect_solutions(
    state: &GraphState,
    causes: &[PossibleCause],
    limit: usize,
) -> Vec<RecommendedSolution> {
    let mut best: BTreeMap<String, RecommendedSolution> = BTreeMap::new();

    for cause in causes {
        for n in state.neighbors_by_type(&cause.entity_id, TraversalDirection::Incoming, RelationType::Resolves) {
            let estimated_success = n.relation.weight * n.entity.confidence;
            if best
                .get(&n.entity.id)
                .is_some_and(|s| s.estimated_success >= estimated_success)
            {
                continue;
            }

            let steps = state
                .neighbors_by_type(&n.entity.id, TraversalDirection::Outgoing, RelationType::Requires)
                .into_iter()
                .filter(|step| step.entity.entity_type == EntityType::Procedure)
                .map(|step| step.entity.name.clone())
                .collect();

            best.insert(
                n.entity.id.clone(),
                RecommendedSolution {
                    solution_id: n.entity.id.clone(),
                    name: n.entity.name.clone(),
                    description: n.entity.description.clone(),
                    cause_id: cause.entity_id.clone(),
                    estimated_success,
                    success_rate: n.relation.success_rate(),
                    steps,
                },
            );
        }
    }

    let mut solutions: Vec<RecommendedSolution> = best.into_values().collect();
    solutions.sort_by(|a, b| {
        b.estimated_success
            .total_cmp(&a.estimated_success)
            .then_with(|| a.solution_id.cmp(&b.solution_id))
    });
    solutions.truncate(limit);
    solutions
}

fn infer_urgency(symptoms: &[String]) -> Urgency {
    let text = symptoms.join(" ").to_lowercase();
    if CRITICAL_KEYWORDS.iter().any(|k| text.contains(k)) {
        Urgency::Critical
    } else if HIGH_KEYWORDS.iter().any(|k| text.contains(k)) {
        Urgency::High
    } else {
        Urgency::Medium
    }
}

/// Equipment the diagnosis is about: the hint if it names an entity,
/// otherwise the equipment most strongly linked to the primary cause
fn affected_equipment<'a>(
    state: &'a GraphState,
    hint: Option<&str>,
    primary: Option<&PossibleCause>,
) -> Option<&'a Entity> {
    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        if let Some(found) = state
            .find_by_name_or_type(hint, Some(EntityType::Equipment))
            .into_iter()
            .next()
        {
            return Some(found);
        }
    }
    let primary = primary?;
    state
        .neighbors_by_type(&primary.entity_id, TraversalDirection::Incoming, RelationType::HasSymptom)
        .into_iter()
        .map(|n| n.entity)
        .find(|e| e.entity_type == EntityType::Equipment)
}

fn level_to_severity(level: u8) -> Severity {
    match level {
        0 | 1 => Severity::Low,
        2 => Severity::Medium,
        3 => Severity::High,
        _ => Severity::Critical,
    }
}

fn severity_level(severity: Severity) -> u8 {
    match severity {
        Severity::Low => 1,
        Severity::Medium => 2,
        Severity::High => 3,
        Severity::Critical => 4,
    }
}

/// Risk grows monotonically with urgency and impact
fn assess_risk(
    state: &GraphState,
    request: &DiagnosisRequest,
    primary: Option<&PossibleCause>,
) -> RiskAssessment {
    let mut factors = Vec::new();
    let urgency = match request.context.urgency {
        Some(urgency) => {
            factors.push(format!("reported urgency {}", urgency));
            urgency
        }
        None => {
            let inferred = infer_urgency(&request.symptoms);
            factors.push(format!("urgency inferred as {} from symptoms", inferred));
            inferred
        }
    };

    let mut impact_level = 1u8;
    if let Some(equipment) = affected_equipment(state, request.equipment.as_deref(), primary) {
        impact_level = 2;
        let name = equipment.name.to_lowercase();
        if CRITICAL_EQUIPMENT.iter().any(|k| name.contains(k)) {
            impact_level = 3;
            factors.push(format!("{} is shared infrastructure", equipment.name));
        }
        let degree = state.degree(&equipment.id);
        if degree >= 5 {
            impact_level += 1;
            factors.push(format!("{} has {} connections", equipment.name, degree));
        }
    }
    let impact = level_to_severity(impact_level);

    let score = urgency.level() * severity_level(impact);
    let risk_level = match score {
        s if s >= 12 => Severity::Critical,
        s if s >= 6 => Severity::High,
        s if s >= 3 => Severity::Medium,
        _ => Severity::Low,
    };

    RiskAssessment {
        urgency,
        impact,
        risk_level,
        factors,
    }
}

fn normalized_set(items: &[String]) -> BTreeSet<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Prior cases by Jaccard overlap of symptom sets, then confidence
fn related_cases(symptoms: &[String], history: &[CaseRecord], limit: usize) -> Vec<RelatedCase> {
    let input = normalized_set(symptoms);
    let mut related: Vec<RelatedCase> = history
        .iter()
        .filter_map(|case| {
            let other = normalized_set(&case.symptoms);
            let union = input.union(&other).count();
            if union == 0 {
                return None;
            }
            let overlap = input.intersection(&other).count() as f32 / union as f32;
            (overlap > 0.0).then(|| RelatedCase {
                case_id: case.id.clone(),
                diagnosis: case.diagnosis.clone(),
                overlap,
                confidence: case.confidence,
            })
        })
        .collect();

    related.sort_by(|a, b| {
        b.overlap
            .total_cmp(&a.overlap)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.case_id.cmp(&b.case_id))
    });
    related.truncate(limit);
    related
}

/// Mean resolution time of related cases, else a default per risk level
fn estimate_resolution_time(related: &[RelatedCase], history: &[CaseRecord], risk: Severity) -> u32 {
    let times: Vec<u32> = related
        .iter()
        .filter_map(|r| history.iter().find(|c| c.id == r.case_id))
        .filter_map(|c| c.resolution_time_minutes)
        .collect();
    if !times.is_empty() {
        let total: u64 = times.iter().map(|&t| u64::from(t)).sum();
        return (total / times.len() as u64) as u32;
    }

    match risk {
        Severity::Low => 30,
        Severity::Medium => 60,
        Severity::High => 120,
        Severity::Critical => 240,
    }
}

fn preventive_measures(state: &GraphState, causes: &[PossibleCause], risk: &RiskAssessment) -> Vec<String> {
    let mut measures = Vec::new();
    let Some(primary) = causes.first() else {
        return measures;
    };

    let touches_software = state
        .neighbors(&primary.entity_id, TraversalDirection::Both)
        .iter()
        .any(|n| {
            matches!(
                n.entity.entity_type,
                EntityType::Os | EntityType::Software | EntityType::Component
            )
        });
    if touches_software {
        measures.push("Keep drivers, firmware and system updates current".to_string());
    }
    if risk.risk_level >= Severity::High {
        measures.push("Schedule preventive maintenance on the affected equipment".to_string());
    }
    measures.push(format!(
        "Document the resolution of '{}' so it can be reused",
        primary.name
    ));
    measures
}

fn next_steps(
    primary: Option<&PossibleCause>,
    solution: Option<&RecommendedSolution>,
    risk: &RiskAssessment,
) -> Vec<String> {
    let mut steps = Vec::new();
    match primary {
        None => {
            steps.push("Collect more details about the symptoms".to_string());
            steps.push("Escalate to level 2 support".to_string());
        }
        Some(primary) => {
            steps.push(format!("Confirm '{}' with the user", primary.name));
            match solution {
                Some(solution) => steps.push(format!("Apply solution '{}'", solution.name)),
                None => steps.push("Escalate to level 2 support".to_string()),
            }
        }
    }
    if risk.risk_level >= Severity::High {
        steps.push("Notify the on-call technician".to_string());
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::relation::{Relation, SUCCESS_RATE_KEY};

    fn graph() -> GraphState {
        let mut state = GraphState::new();
        for entity in [
            Entity::new("eq", "Dell Latitude", EntityType::Equipment),
            Entity::new("err-blue", "Écran bleu", EntityType::Error).with_confidence(0.8),
            Entity::new("err-boot", "Écran bleu au démarrage", EntityType::Error).with_confidence(0.9),
            Entity::new("sym", "Lenteur", EntityType::Symptom)
                .with_description("Poste lent après un écran bleu")
                .with_confidence(0.9),
            Entity::new("sol", "Mettre à jour les pilotes", EntityType::Solution).with_confidence(0.9),
            Entity::new("p1", "Ouvrir le gestionnaire", EntityType::Procedure),
            Entity::new("p2", "Installer le pilote", EntityType::Procedure),
        ] {
            state.insert_entity(entity).unwrap();
        }
        for relation in [
            Relation::new("r1", "eq", "err-blue", RelationType::HasSymptom).with_weight(0.7),
            Relation::new("r2", "sol", "err-blue", RelationType::Resolves)
                .with_weight(0.8)
                .with_property(SUCCESS_RATE_KEY, 0.75),
            Relation::new("r3", "sol", "p1", RelationType::Requires).with_weight(1.0),
            Relation::new("r4", "sol", "p2", RelationType::Requires).with_weight(0.95),
        ] {
            state.insert_relation(relation).unwrap();
        }
        state
    }

    #[test]
    fn test_match_strength_rules() {
        let blue = Entity::new("a", "Écran bleu", EntityType::Error);
        assert_eq!(match_strength("écran bleu", &blue), 1.0);
        assert!((match_strength("bleu", &blue) - 0.4).abs() < 1e-6);
        assert!((match_strength("écran bleu au démarrage", &blue) - 10.0 / 23.0).abs() < 1e-6);
        assert_eq!(match_strength("imprimante", &blue), 0.0);

        let slow = Entity::new("b", "Lenteur", EntityType::Symptom).with_description("poste lent");
        assert!((match_strength("poste", &slow) - 0.5 * 5.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_causes_ranked_by_probability() {
        let causes = rank_causes(&graph(), &["écran bleu".to_string()], None);
        let ids: Vec<&str> = causes.iter().map(|c| c.entity_id.as_str()).collect();

        // 0.8 × 1.0, then 0.9 × 0.5 (description), then 0.9 × 10/23
        assert_eq!(ids, vec!["err-blue", "sym", "err-boot"]);
        assert!((causes[0].probability - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut state = GraphState::new();
        state
            .insert_entity(Entity::new("b", "Bourrage", EntityType::Error).with_confidence(0.6))
            .unwrap();
        state
            .insert_entity(Entity::new("a", "Bourrage", EntityType::Symptom).with_confidence(0.6))
            .unwrap();

        let first = rank_causes(&state, &["bourrage".to_string()], None);
        let second = rank_causes(&state, &["bourrage".to_string()], None);
        assert_eq!(first, second);
        assert_eq!(first[0].entity_id, "a");
    }

    #[test]
    fn test_diagnosis_collects_solutions_and_steps() {
        let request = DiagnosisRequest::new(["écran bleu"]).with_equipment("Dell");
        let result = diagnose(&graph(), &request, &DiagnosisConfig::default()).unwrap();

        assert_eq!(result.primary_issue.as_ref().unwrap().entity_id, "err-blue");
        let solution = &result.recommended_solutions[0];
        assert_eq!(solution.solution_id, "sol");
        assert!((solution.estimated_success - 0.72).abs() < 1e-6);
        assert_eq!(solution.steps, vec!["Ouvrir le gestionnaire", "Installer le pilote"]);
        assert_eq!(solution.success_rate, Some(0.75));
        assert!(
            result.possible_causes[0]
                .evidence
                .iter()
                .any(|e| e.contains("Dell Latitude"))
        );
        assert_eq!(result.next_steps[1], "Apply solution 'Mettre à jour les pilotes'");
    }

    #[test]
    fn test_risk_is_monotonic_in_urgency() {
        let state = graph();
        let low = assess_risk(&state, &DiagnosisRequest::new(["x"]).with_urgency(Urgency::Low), None);
        let critical = assess_risk(
            &state,
            &DiagnosisRequest::new(["x"]).with_urgency(Urgency::Critical),
            None,
        );
        assert!(critical.risk_level > low.risk_level);

        let inferred = assess_risk(&state, &DiagnosisRequest::new(["écran bleu"]), None);
        assert_eq!(inferred.urgency, Urgency::High);
    }

    #[test]
    fn test_related_cases_and_resolution_time() {
        let history = vec![
            CaseRecord {
                id: "c1".into(),
                symptoms: vec!["écran bleu".into(), "lenteur".into()],
                diagnosis: "pilote".into(),
                confidence: 0.6,
                resolution_time_minutes: Some(40),
            },
            CaseRecord {
                id: "c2".into(),
                symptoms: vec!["Écran bleu".into()],
                diagnosis: "RAM".into(),
                confidence: 0.9,
                resolution_time_minutes: Some(80),
            },
            CaseRecord {
                id: "c3".into(),
                symptoms: vec!["bourrage".into()],
                diagnosis: "papier".into(),
                confidence: 0.9,
                resolution_time_minutes: Some(5),
            },
        ];
        let request = DiagnosisRequest::new(["écran bleu"]).with_history(history);
        let result = diagnose(&graph(), &request, &DiagnosisConfig::default()).unwrap();

        let ids: Vec<&str> = result.related_cases.iter().map(|c| c.case_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
        assert_eq!(result.estimated_resolution_time, 60);
    }

    #[test]
    fn test_empty_graph_yields_empty_result() {
        let result = diagnose(
            &GraphState::new(),
            &DiagnosisRequest::new(["écran bleu"]),
            &DiagnosisConfig::default(),
        )
        .unwrap();
        assert!(result.primary_issue.is_none());
        assert_eq!(result.confidence, 0.0);
        assert!(result.recommended_solutions.is_empty());
        assert_eq!(result.next_steps[0], "Collect more details about the symptoms");
    }

    #[test]
    fn test_blank_symptoms_rejected() {
        let err = diagnose(
            &GraphState::new(),
            &DiagnosisRequest::new(["  "]),
            &DiagnosisConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_quick_suggestions_respect_limit() {
        let suggestions = quick_suggestions(&graph(), "écran", None, 2);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].entity_id, "err-blue");
    }
}
