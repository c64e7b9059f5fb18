//! HTTP surface — draft generation, logs, health, and the review WS.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::model::InboundMessage;
use crate::pipeline::DraftPipeline;
use crate::review::ws::review_routes;
use crate::review::ReviewCoordinator;

const DEFAULT_LOGS_LIMIT: usize = 50;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<DraftPipeline>,
}

/// Build the full application router.
pub fn app_routes(pipeline: Arc<DraftPipeline>, coordinator: Arc<ReviewCoordinator>) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/health", get(health))
        .route("/api/drafts/generate", post(generate_draft))
        .route("/api/logs", get(list_logs))
        .with_state(state)
        .merge(review_routes(coordinator))
        .layer(CorsLayer::permissive())
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mail-triage"
    }))
}

// ── Draft generation ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GenerateRequest {
    #[serde(flatten)]
    message: InboundMessage,
    user_id: String,
}

async fn generate_draft(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    match state
        .pipeline
        .generate_draft(&request.message, &request.user_id)
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(serde_json::json!(reply))),
        Err(e) => {
            error!(error = %e, "Draft generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

// ── Request logs ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LogsParams {
    limit: Option<usize>,
}

async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_LOGS_LIMIT);
    match state.pipeline.recent_outcomes(limit).await {
        Ok(outcomes) => (StatusCode::OK, Json(serde_json::json!(outcomes))),
        Err(e) => {
            error!(error = %e, "Failed to load request logs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}
