use std::str::FromStr;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::handlers::orders::OrderResponse;
use crate::models::OrderStatus;
use crate::services::payments::constant_time_eq;
use crate::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", patch(update_order_status))
        .route("/orders/:id/refund", post(refund_order))
}

fn require_admin(headers: &HeaderMap, config: &AppConfig) -> Result<(), ServiceError> {
    let expected = config
        .admin_api_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            ServiceError::ConfigurationError("admin_api_token is not configured".to_string())
        })?;

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing admin token".to_string()))?;

    if !constant_time_eq(expected, provided) {
        warn!("Admin request rejected: invalid token");
        return Err(ServiceError::Unauthorized("invalid admin token".to_string()));
    }
    Ok(())
}

/// Fields are optional so missing values produce a clean 400 instead of a
/// deserializer rejection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub id: Option<Uuid>,
    pub status: Option<String>,
}

/// Forces an order into an arbitrary status, bypassing the transition
/// table. Always audited; support tooling owns the consequences.
#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status overridden"),
        (status = 400, description = "Missing or invalid fields", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid admin token", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    require_admin(&headers, &state.config)?;

    let id = request
        .id
        .ok_or_else(|| ServiceError::BadRequest("missing field: id".to_string()))?;
    let status_raw = request
        .status
        .ok_or_else(|| ServiceError::BadRequest("missing field: status".to_string()))?;
    let status = OrderStatus::from_str(&status_raw)
        .map_err(|_| ServiceError::BadRequest(format!("unknown status: {status_raw}")))?;

    // Store-level write failures surface as client errors here; the admin
    // tooling treats them as a rejected request, not an outage.
    let updated = state
        .services
        .orders
        .override_status(id, status, "admin")
        .await
        .map_err(|e| match e {
            ServiceError::DatabaseError(db) => {
                ServiceError::BadRequest(format!("store rejected status write: {db}"))
            }
            other => other,
        })?;

    Ok(Json(json!({ "ok": true, "data": OrderResponse::from(updated) })))
}

/// Starts a provider-side refund for a paid order. The order stays `paid`
/// until the `charge.refunded` webhook lands.
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/refund",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Refund initiated"),
        (status = 400, description = "Order not refundable", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid admin token", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse),
    ),
    tag = "admin"
)]
pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    require_admin(&headers, &state.config)?;

    let order = state.services.orders.initiate_refund(id, "admin").await?;
    Ok(Json(json!({ "ok": true, "data": OrderResponse::from(order) })))
}
