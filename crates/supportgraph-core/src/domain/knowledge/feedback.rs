//! Feedback records submitted by users about graph knowledge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// What a feedback record is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTarget {
    Entity,
    Relation,
    /// A diagnosis; `targetId` names the diagnosed cause entity
    Diagnosis,
    /// A suggested solution; `targetId` names the solution entity
    Solution,
}

impl FeedbackTarget {
    /// Whether the target id refers to a relation rather than an entity
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Relation => "relation",
            Self::Diagnosis => "diagnosis",
            Self::Solution => "solution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "entity" => Some(Self::Entity),
            "relation" | "relationship" => Some(Self::Relation),
            "diagnosis" => Some(Self::Diagnosis),
            "solution" => Some(Self::Solution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

/// A user's judgement of an entity, relation, diagnosis or solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    #[serde(default)]
    pub id: String,
    pub target_type: FeedbackTarget,
    pub target_id: String,
    /// 1 (useless) to 5 (exactly right)
    pub rating: u8,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub processed: bool,
    /// Caller-supplied key guarding against double application
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl FeedbackRecord {
    pub fn new(target_type: FeedbackTarget, target_id: impl Into<String>, rating: u8) -> Self {
        Self {
            id: String::new(),
            target_type,
            target_id: target_id.into(),
            rating,
            sentiment: Sentiment::Neutral,
            comments: String::new(),
            context: Value::Null,
            user_id: None,
            timestamp: Utc::now(),
            processed: false,
            idempotency_key: None,
        }
    }

    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = comments.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Reject ratings outside 1-5 and empty targets
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(Error::InvalidInput(format!(
                "rating must be between 1 and 5, got {}",
                self.rating
            )));
        }
        if self.target_id.trim().is_empty() {
            return Err(Error::InvalidInput("targetId must not be empty".into()));
        }
        Ok(())
    }

    /// The explicit idempotency key, or a digest of the submission content
    ///
    /// The digest covers who said what about which target, so an identical
    /// resubmission maps to the same key.
    pub fn effective_idempotency_key(&self) -> String {
        if let Some(key) = &self.idempotency_key {
            return key.clone();
        }

        let mut hasher = Sha256::new();
        hasher.update(self.target_type.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.target_id.as_bytes());
        hasher.update([0, self.rating]);
        hasher.update(format!("{:?}", self.sentiment).as_bytes());
        hasher.update([0]);
        hasher.update(self.comments.as_bytes());
        hasher.update([0]);
        hasher.update(self.user_id.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_validation() {
        assert!(FeedbackRecord::new(FeedbackTarget::Entity, "e", 3).validate().is_ok());
        assert!(FeedbackRecord::new(FeedbackTarget::Entity, "e", 0).validate().is_err());
        assert!(FeedbackRecord::new(FeedbackTarget::Entity, "e", 6).validate().is_err());
        assert!(FeedbackRecord::new(FeedbackTarget::Entity, " ", 3).validate().is_err());
    }

    #[test]
    fn test_digest_key_is_stable_for_identical_content() {
        let a = FeedbackRecord::new(FeedbackTarget::Entity, "e", 5)
            .with_sentiment(Sentiment::Positive)
            .with_user("u1");
        let b = a.clone();
        assert_eq!(a.effective_idempotency_key(), b.effective_idempotency_key());

        let c = a.clone().with_comments("different");
        assert_ne!(a.effective_idempotency_key(), c.effective_idempotency_key());
        assert!(a.effective_idempotency_key().starts_with("sha256:"));
    }

    #[test]
    fn test_explicit_key_wins() {
        let record = FeedbackRecord::new(FeedbackTarget::Relation, "r", 2).with_idempotency_key("k-1");
        assert_eq!(record.effective_idempotency_key(), "k-1");
    }

    #[test]
    fn test_deserialize_minimal_payload() {
        let record: FeedbackRecord = serde_json::from_str(
            r#"{"targetType":"solution","targetId":"sol-1","rating":4,"sentiment":"positive"}"#,
        )
        .unwrap();
        assert_eq!(record.target_type, FeedbackTarget::Solution);
        assert_eq!(record.sentiment, Sentiment::Positive);
        assert!(!record.processed);
    }
}
