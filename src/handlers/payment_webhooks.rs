use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use crate::errors::ServiceError;
use crate::services::payments::verify_stripe_signature;
use crate::services::reconciliation::ProviderEvent;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhook", post(stripe_webhook))
}

/// Receives provider webhooks. Signature verification runs against the raw
/// body before anything is parsed; once the payload is authenticated, all
/// downstream failures are logged and acknowledged so the provider stops
/// retrying events we cannot act on.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body(content = Vec<u8>, description = "Raw provider event payload"),
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Webhook secrets not configured", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if state.config.stripe_secret_key.is_none() {
        return Err(ServiceError::ConfigurationError(
            "stripe_secret_key is not configured".to_string(),
        ));
    }
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| {
            ServiceError::ConfigurationError("stripe_webhook_secret is not configured".to_string())
        })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ServiceError::SignatureError("missing stripe-signature header".to_string())
        })?;

    verify_stripe_signature(
        &body,
        signature,
        secret,
        state.config.stripe_webhook_tolerance_secs,
    )?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {e}")))?;

    let event = ProviderEvent::parse(&payload);
    match state.services.reconciliation.handle_provider_event(event).await {
        Ok(Some(transition)) => info!(?transition, "Webhook applied"),
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "Webhook reconciliation failed; acknowledging anyway");
        }
    }

    Ok(Json(json!({ "received": true })))
}
