use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use zenith_commerce::config::{self, AppConfig};
use zenith_commerce::db;
use zenith_commerce::events::{self, EventSender};
use zenith_commerce::handlers::AppServices;
use zenith_commerce::services::orders::{CheckoutSettings, OrderService};
use zenith_commerce::services::payments::StripeClient;
use zenith_commerce::services::receipts::{Mailer, ResendMailer};
use zenith_commerce::services::reconciliation::ReconciliationService;
use zenith_commerce::services::wallet::{HttpWalletVerifier, WalletVerifier};
use zenith_commerce::store::{OrderStore, ProductCatalog, SeaOrmOrderStore};
use zenith_commerce::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;
    config::init_tracing(config.log_level(), config.log_json);

    info!(environment = %config.environment, "Starting Zenith Commerce");

    let db = Arc::new(db::establish_connection_from_app_config(&config).await?);
    let seaorm_store = Arc::new(SeaOrmOrderStore::new(db));
    let store: Arc<dyn OrderStore> = seaorm_store.clone();
    let catalog: Arc<dyn ProductCatalog> = seaorm_store;

    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    let event_sender = EventSender::new(tx);
    tokio::spawn(events::process_events(rx));

    let stripe = config
        .stripe_secret_key
        .clone()
        .map(|key| Arc::new(StripeClient::new(key)));
    if stripe.is_none() {
        warn!("No Stripe secret key configured; orders will be created without checkout sessions");
    }

    let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(
        config.resend_api_key.clone(),
        config.email_from.clone(),
    ));

    let wallet: Option<Arc<dyn WalletVerifier>> =
        match (&config.wallet_verify_url, &config.wallet_merchant_code) {
            (Some(url), Some(code)) => Some(Arc::new(HttpWalletVerifier::new(
                url.clone(),
                code.clone(),
            ))),
            _ => None,
        };

    let orders = Arc::new(OrderService::new(
        store.clone(),
        stripe,
        Some(Arc::new(event_sender.clone())),
        CheckoutSettings {
            currency: config.default_currency.clone(),
            success_url: config.checkout_success_url.clone(),
            cancel_url: config.checkout_cancel_url.clone(),
        },
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        store.clone(),
        mailer,
        Some(Arc::new(event_sender.clone())),
    ));

    let state = AppState {
        store,
        config: config.clone(),
        services: AppServices {
            orders,
            reconciliation,
            wallet,
            catalog,
        },
        event_sender,
    };

    let router = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(build_cors_layer(&config));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    if config.has_cors_allowed_origins() {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();

        let mut layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                HeaderName::from_static("x-admin-token"),
            ]);
        if config.cors_allow_credentials {
            layer = layer.allow_credentials(true);
        }
        layer
    } else {
        // Development fallback; load_config refuses this outside development
        // unless explicitly opted in.
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
