use async_trait::async_trait;
use reqwest::Client;
use tracing::{instrument, warn};

use crate::errors::ServiceError;

/// Verifies a regional-wallet payment by calling back to the wallet
/// gateway. Implementations must fail closed: any doubt means `false`.
#[async_trait]
pub trait WalletVerifier: Send + Sync {
    async fn verify(
        &self,
        amount: &str,
        order_ref: &str,
        payment_reference: &str,
    ) -> Result<bool, ServiceError>;
}

/// Verifier that replays the payment parameters to the gateway's
/// server-to-server verification endpoint and checks the textual response.
pub struct HttpWalletVerifier {
    client: Client,
    verify_url: String,
    merchant_code: String,
}

impl HttpWalletVerifier {
    pub fn new(verify_url: String, merchant_code: String) -> Self {
        Self {
            client: Client::new(),
            verify_url,
            merchant_code,
        }
    }
}

#[async_trait]
impl WalletVerifier for HttpWalletVerifier {
    #[instrument(skip(self), fields(order_ref, payment_reference))]
    async fn verify(
        &self,
        amount: &str,
        order_ref: &str,
        payment_reference: &str,
    ) -> Result<bool, ServiceError> {
        let response = self
            .client
            .get(&self.verify_url)
            .query(&[
                ("amt", amount),
                ("scd", self.merchant_code.as_str()),
                ("oid", order_ref),
                ("rid", payment_reference),
            ])
            .send()
            .await;

        // Network failure is a verification failure, never a success.
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Wallet verification request failed");
                return Ok(false);
            }
        };

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Wallet verification response unreadable");
                return Ok(false);
            }
        };

        // The gateway answers with a short XML/text body; the legacy
        // contract is a substring match on "Success".
        Ok(body.contains("Success"))
    }
}
