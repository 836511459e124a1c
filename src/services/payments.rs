use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::store::NewOrderItem;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

/// Thin client for the card processor's checkout-session and refund APIs.
/// All consistency concerns (retries, idempotent redelivery) stay on the
/// provider side; this client performs single round trips.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    /// Points the client at a different API base. Used by tests.
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    /// Opens a hosted checkout session for a freshly created order.
    /// `metadata[order_id]` is what ties the later webhook back to our row.
    pub async fn create_checkout_session(
        &self,
        order_id: Uuid,
        currency: &str,
        items: &[NewOrderItem],
        success_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String), ServiceError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), success_url.into()),
            ("cancel_url".into(), cancel_url.into()),
            ("metadata[order_id]".into(), order_id.to_string()),
        ];

        for (i, item) in items.iter().enumerate() {
            form.push((
                format!("line_items[{i}][price_data][currency]"),
                currency.to_ascii_lowercase(),
            ));
            form.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            form.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                minor_units(item.unit_price)?.to_string(),
            ));
            form.push((format!("line_items[{i}][quantity]"), item.qty.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("checkout session: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentProvider(format!(
                "checkout session: {error_text}"
            )));
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("session response: {e}")))?;

        Ok((session.id, session.url))
    }

    /// Initiates a refund for a captured payment intent. Does not touch the
    /// order row; the `charge.refunded` webhook is the sole writer of the
    /// refunded state.
    pub async fn refund_payment_intent(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(format!("{}/refunds", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[("payment_intent", payment_intent_id)])
            .send()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("refund: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentProvider(format!("refund: {error_text}")));
        }

        Ok(())
    }
}

/// Converts a decimal major-unit amount into the provider's integer minor
/// units (e.g. 12.50 -> 1250).
fn minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount out of range: {amount}")))
}

/// Verifies the provider's `stripe-signature` header against the raw
/// payload. Must run before any parse that trusts the body; it is the
/// sole authentication mechanism on the webhook path.
///
/// Header format: `t=<unix ts>,v1=<hex hmac>`; the signed message is
/// `{t}.{payload}` under HMAC-SHA256 with the webhook secret.
pub fn verify_stripe_signature(
    payload: &[u8],
    signature: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), ServiceError> {
    let mut timestamp = None;
    let mut sig_v1 = None;

    for part in signature.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            sig_v1 = Some(s);
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ServiceError::SignatureError("missing timestamp".to_string()))?;
    let sig_v1 =
        sig_v1.ok_or_else(|| ServiceError::SignatureError("missing v1 signature".to_string()))?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| ServiceError::SignatureError("invalid timestamp".to_string()))?;

    let age = chrono::Utc::now().timestamp() - ts;
    if age.unsigned_abs() > tolerance_secs {
        warn!(age, tolerance_secs, "Webhook rejected: timestamp outside tolerance");
        return Err(ServiceError::SignatureError(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::ConfigurationError("invalid webhook secret".to_string()))?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(&expected, sig_v1) {
        return Err(ServiceError::SignatureError(
            "signature mismatch".to_string(),
        ));
    }

    Ok(())
}

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
