//! Derived insights
//!
//! Insights are recomputed from a graph snapshot or from the effect of a
//! feedback submission. They are reported to callers and never stored.

use serde::{Deserialize, Serialize};

/// Kind of observation an insight describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Correlation,
    Pattern,
    Anomaly,
    Prediction,
}

/// Severity levels, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived observation about the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub confidence: f32,
    pub impact: Severity,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Insight {
    pub fn new(
        insight_type: InsightType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            insight_type,
            title: title.into(),
            description: description.into(),
            confidence: 0.5,
            impact: Severity::Low,
            entity_ids: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_impact(mut self, impact: Severity) -> Self {
        self.impact = impact;
        self
    }

    pub fn with_entities(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.entity_ids.extend(ids);
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }
}
