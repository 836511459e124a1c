pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod services;
pub mod store;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::handlers::AppServices;
use crate::store::OrderStore;

/// Shared application state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub config: AppConfig,
    pub services: AppServices,
    pub event_sender: EventSender,
}

/// All versioned API routes, nested under `/api/v1` by [`app`].
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/orders", handlers::orders::routes())
        .nest("/products", handlers::products::routes())
        .nest(
            "/payments",
            handlers::payment_webhooks::routes().merge(handlers::wallet::routes()),
        )
        .nest("/admin", handlers::admin::routes())
        .route("/openapi.json", get(openapi_spec))
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}

/// Builds the complete router. Middleware layers (trace, timeout, CORS)
/// are applied by the binary so tests get a bare router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::health::routes())
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}
