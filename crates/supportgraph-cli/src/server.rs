//! HTTP surface over the knowledge API

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use supportgraph_core::api::{
    DiagnoseRequest, EnrichRequest, FeedbackRequest, KnowledgeApi, QuickSuggestionQuery,
};
use supportgraph_core::domain::knowledge::{AnalysisWindow, EntityType, render_svg};
use supportgraph_core::error::Error;
use tracing::{error, info, warn};

pub type AppState = Arc<KnowledgeApi>;

/// Core errors mapped to HTTP statuses
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::EntityNotFound(_) | Error::RelationNotFound(_) => StatusCode::NOT_FOUND,
            Error::UnknownEntity { .. } | Error::TypeConflict { .. } => StatusCode::CONFLICT,
            Error::ExtractionParseError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::ExtractionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::NetworkError(_) | Error::LLMError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            warn!(code = self.0.code(), error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
            suggestion: self.0.suggestion(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(api: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/enrich", post(enrich))
        .route("/api/feedback", post(feedback))
        .route("/api/diagnose", post(diagnose).get(quick_suggestions))
        .route("/api/analytics", get(analytics))
        .route("/api/graph/layout", get(layout))
        .with_state(api)
}

pub async fn serve(api: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Supportgraph server listening");
    axum::serve(listener, router(api))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn health(State(api): State<AppState>) -> impl IntoResponse {
    Json(api.health().await)
}

/// POST /api/enrich
async fn enrich(
    State(api): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(api.enrich(request).await?))
}

/// POST /api/feedback
async fn feedback(
    State(api): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(api.feedback(request).await?))
}

/// POST /api/diagnose
async fn diagnose(
    State(api): State<AppState>,
    Json(request): Json<DiagnoseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(api.diagnose(&request).await?))
}

/// GET /api/diagnose?q=&equipment=
async fn quick_suggestions(
    State(api): State<AppState>,
    Query(query): Query<QuickSuggestionQuery>,
) -> impl IntoResponse {
    Json(api.quick_suggestions(&query).await)
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsQuery {
    /// Growth window length in days
    days: Option<i64>,
}

/// GET /api/analytics?days=
async fn analytics(
    State(api): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = match query.days {
        Some(days) if days <= 0 => {
            return Err(Error::InvalidInput("days must be positive".into()).into());
        }
        Some(days) => Some(AnalysisWindow::last_days(days)),
        None => None,
    };
    Ok(Json(api.analytics(window).await))
}

#[derive(Debug, Default, Deserialize)]
struct LayoutQuery {
    /// Comma-separated entity types to include
    types: Option<String>,
    ticks: Option<usize>,
    /// `json` (default) or `svg`
    format: Option<String>,
}

/// GET /api/graph/layout?types=&ticks=&format=
async fn layout(
    State(api): State<AppState>,
    Query(query): Query<LayoutQuery>,
) -> Result<Response, ApiError> {
    let types = parse_types(query.types.as_deref())?;
    let state = api.layout(&types, query.ticks).await;

    match query.format.as_deref() {
        Some("svg") => Ok(([(header::CONTENT_TYPE, "image/svg+xml")], render_svg(&state)).into_response()),
        None | Some("json") => Ok(Json(state).into_response()),
        Some(other) => Err(Error::InvalidInput(format!("unknown layout format '{}'", other)).into()),
    }
}

pub fn parse_types(raw: Option<&str>) -> Result<Vec<EntityType>, Error> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            EntityType::parse(s)
                .ok_or_else(|| Error::InvalidInput(format!("unknown entity type '{}'", s)))
        })
        .collect()
}
