use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/wallet/callback", get(wallet_callback))
}

/// Query parameters the wallet gateway appends to its browser redirect.
/// All optional at the type level; the handler fails closed on anything
/// missing.
#[derive(Debug, Deserialize)]
pub struct WalletCallbackParams {
    pub oid: Option<String>,
    pub amt: Option<String>,
    #[serde(rename = "refId")]
    pub ref_id: Option<String>,
}

/// Browser return leg of the regional wallet flow. The redirect itself is
/// untrusted; payment truth comes from the server-to-server verification
/// call, and any failure sends the shopper to the cancel page.
#[utoipa::path(
    get,
    path = "/api/v1/payments/wallet/callback",
    params(
        ("oid" = Option<String>, Query, description = "Merchant order reference"),
        ("amt" = Option<String>, Query, description = "Paid amount as reported by the gateway"),
        ("refId" = Option<String>, Query, description = "Gateway payment reference"),
    ),
    responses((status = 303, description = "Redirect to the success or cancel page")),
    tag = "payments"
)]
#[instrument(skip(state, params))]
pub async fn wallet_callback(
    State(state): State<AppState>,
    params: Result<Query<WalletCallbackParams>, QueryRejection>,
) -> Redirect {
    let cancel_url = state.config.wallet_cancel_url.clone();

    // A query string the extractor cannot decode is just another bad
    // callback; the shopper still lands on the cancel page.
    let Query(params) = match params {
        Ok(query) => query,
        Err(rejection) => {
            warn!(error = %rejection, "Wallet callback query rejected; redirecting to cancel");
            return Redirect::to(&cancel_url);
        }
    };

    let (Some(oid), Some(amt), Some(ref_id)) = (params.oid, params.amt, params.ref_id) else {
        warn!("Wallet callback missing parameters; redirecting to cancel");
        return Redirect::to(&cancel_url);
    };

    let Some(verifier) = &state.services.wallet else {
        warn!("Wallet callback received but no wallet gateway is configured");
        return Redirect::to(&cancel_url);
    };

    match verifier.verify(&amt, &oid, &ref_id).await {
        Ok(true) => {
            // TODO: resolve `oid` to a persisted order and transition it to
            // paid once wallet checkouts start carrying our order UUID.
            info!(%oid, %ref_id, "Wallet payment verified");
            Redirect::to(&state.config.wallet_success_url)
        }
        Ok(false) => {
            warn!(%oid, %ref_id, "Wallet payment verification failed");
            Redirect::to(&cancel_url)
        }
        Err(e) => {
            warn!(%oid, %ref_id, error = %e, "Wallet verification errored");
            Redirect::to(&cancel_url)
        }
    }
}
