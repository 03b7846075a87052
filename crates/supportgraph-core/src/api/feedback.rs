//! Feedback requests: ratings, manual overrides and resolution traces

use serde::{Deserialize, Serialize};

use super::KnowledgeApi;
use crate::domain::knowledge::{
    ConfidenceTarget, FeedbackOutcome, FeedbackRecord, ResolutionOutcome, ResolutionTrace,
    UpdateResult,
};
use crate::error::{Error, Result};

/// Manual confidence override; exactly one of the ids must be set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceOverride {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub relation_id: Option<String>,
    pub new_confidence: f32,
    pub reason: String,
}

impl ConfidenceOverride {
    pub fn target(&self) -> Result<ConfidenceTarget> {
        match (&self.entity_id, &self.relation_id) {
            (Some(id), None) => Ok(ConfidenceTarget::Entity(id.clone())),
            (None, Some(id)) => Ok(ConfidenceTarget::Relation(id.clone())),
            _ => Err(Error::InvalidInput(
                "set exactly one of entityId or relationId".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
pub enum FeedbackRequest {
    SubmitFeedback(FeedbackRecord),
    UpdateConfidence(ConfidenceOverride),
    LearnFromResolution(ResolutionTrace),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FeedbackResponse {
    Submitted(FeedbackOutcome),
    Updated(UpdateResult),
    Learned(ResolutionOutcome),
}

impl KnowledgeApi {
    pub async fn feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse> {
        match request {
            FeedbackRequest::SubmitFeedback(record) => self
                .learner
                .submit_feedback(record)
                .await
                .map(FeedbackResponse::Submitted),
            FeedbackRequest::UpdateConfidence(update) => {
                let target = update.target()?;
                self.learner
                    .update_confidence(target, update.new_confidence, &update.reason)
                    .await
                    .map(FeedbackResponse::Updated)
            }
            FeedbackRequest::LearnFromResolution(trace) => self
                .learner
                .learn_from_resolution(&trace)
                .await
                .map(FeedbackResponse::Learned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::memory_api;
    use crate::domain::knowledge::{Entity, EntityType};
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_feedback_request() {
        let api = memory_api();
        api.store()
            .add_entity(Entity::new("sol-1", "Mettre à jour le pilote", EntityType::Solution).with_confidence(0.9))
            .await
            .unwrap();

        let request: FeedbackRequest = serde_json::from_value(json!({
            "action": "submit-feedback",
            "data": {"targetType": "solution", "targetId": "sol-1", "rating": 5, "sentiment": "positive"}
        }))
        .unwrap();
        let body = serde_json::to_value(api.feedback(request).await.unwrap()).unwrap();

        assert!(body["feedbackId"].as_str().is_some());
        assert_eq!(body["updateResult"]["success"], true);
        let confidence = body["updateResult"]["newConfidence"].as_f64().unwrap();
        assert!((confidence - 0.98).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_update_confidence_missing_target() {
        let api = memory_api();
        let request: FeedbackRequest = serde_json::from_value(json!({
            "action": "update-confidence",
            "data": {"entityId": "ghost", "newConfidence": 0.7, "reason": "checked on site"}
        }))
        .unwrap();
        let body = serde_json::to_value(api.feedback(request).await.unwrap()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], "not_found");
    }

    #[tokio::test]
    async fn test_update_confidence_needs_one_target() {
        let api = memory_api();
        let err = api
            .feedback(FeedbackRequest::UpdateConfidence(ConfidenceOverride {
                entity_id: Some("a".into()),
                relation_id: Some("b".into()),
                new_confidence: 0.5,
                reason: "both".into(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
