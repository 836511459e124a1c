use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::errors::ServiceError;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

/// Liveness probe. Always succeeds while the process is serving.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is alive")),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness probe. Exercises the order store with a minimal read.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Store reachable"),
        (status = 500, description = "Store unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "health"
)]
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    state.store.list_orders(1, 1).await?;
    Ok(Json(json!({ "status": "ready" })))
}
