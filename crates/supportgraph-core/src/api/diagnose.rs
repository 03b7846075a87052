//! Diagnosis requests

use serde::{Deserialize, Serialize};

use super::KnowledgeApi;
use crate::domain::knowledge::{DiagnosisRequest, DiagnosisResult, PossibleCause};
use crate::error::Result;

/// Body of `POST diagnose`
pub type DiagnoseRequest = DiagnosisRequest;

/// Query string of `GET diagnose?q=&equipment=`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickSuggestionQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub equipment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickSuggestions {
    pub query: String,
    pub suggestions: Vec<PossibleCause>,
}

impl KnowledgeApi {
    pub async fn diagnose(&self, request: &DiagnoseRequest) -> Result<DiagnosisResult> {
        self.diagnosis.diagnose(request).await
    }

    pub async fn quick_suggestions(&self, query: &QuickSuggestionQuery) -> QuickSuggestions {
        let suggestions = self
            .diagnosis
            .quick_suggestions(&query.q, query.equipment.as_deref())
            .await;
        QuickSuggestions {
            query: query.q.clone(),
            suggestions,
        }
    }
}
