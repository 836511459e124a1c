use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use crate::entities::{order, order_item};
use crate::errors::ServiceError;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Outcome of a receipt send. `Disabled` means no API key is configured,
/// which is the normal state in development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailOutcome {
    Sent,
    Disabled,
}

/// Transactional email capability. Receipt sends are best-effort; callers
/// record failures as audit events and never fail the request over them.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_receipt(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<MailOutcome, ServiceError>;
}

/// Mailer backed by the Resend HTTP API. Runs in disabled mode when no API
/// key is configured.
pub struct ResendMailer {
    client: Client,
    api_key: Option<String>,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: Option<String>, from: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    #[instrument(skip(self, order, items), fields(order_id = %order.id, to = %order.email))]
    async fn send_receipt(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<MailOutcome, ServiceError> {
        let Some(api_key) = &self.api_key else {
            info!("Email disabled; skipping receipt");
            return Ok(MailOutcome::Disabled);
        };

        let body = json!({
            "from": self.from,
            "to": [order.email],
            "subject": format!("Receipt for order {}", order.id),
            "html": render_receipt_html(order, items),
        });

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("email send: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "email send: {status}: {error_text}"
            )));
        }

        info!("Receipt email sent");
        Ok(MailOutcome::Sent)
    }
}

/// Renders the receipt body. Plain table layout; mail clients get nothing
/// fancier than inline styles.
pub fn render_receipt_html(order: &order::Model, items: &[order_item::Model]) -> String {
    let mut rows = String::new();
    for item in items {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{} {}</td><td>{} {}</td></tr>",
            html_escape(&item.name),
            item.qty,
            item.unit_price,
            order.currency,
            item.line_total,
            order.currency,
        ));
    }

    format!(
        "<h2>Thanks for your order</h2>\
         <p>Order <strong>{id}</strong> has been paid.</p>\
         <table cellpadding=\"6\" border=\"1\" style=\"border-collapse:collapse\">\
         <tr><th>Item</th><th>Qty</th><th>Unit price</th><th>Total</th></tr>\
         {rows}\
         </table>\
         <p>Subtotal: {subtotal} {currency}<br>\
         Tax: {tax} {currency}<br>\
         Shipping: {shipping} {currency}<br>\
         <strong>Total: {total} {currency}</strong></p>",
        id = order.id,
        rows = rows,
        subtotal = order.subtotal,
        tax = order.tax,
        shipping = order.shipping,
        total = order.total,
        currency = order.currency,
    )
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn paid_order() -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            email: "buyer@example.com".into(),
            status: "paid".into(),
            subtotal: dec!(25),
            tax: dec!(0),
            shipping: dec!(0),
            total: dec!(25),
            currency: "USD".into(),
            stripe_session_id: None,
            stripe_payment_intent_id: Some("pi_1".into()),
            shipping_address: None,
            shipping_method: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn disabled_mailer_reports_disabled() {
        let mailer = ResendMailer::new(None, "orders@example.com".into());
        let outcome = mailer.send_receipt(&paid_order(), &[]).await.unwrap();
        assert_eq!(outcome, MailOutcome::Disabled);
    }

    #[test]
    fn receipt_html_escapes_item_names() {
        let order = paid_order();
        let items = vec![order_item::Model {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id: Uuid::new_v4(),
            name: "Widget <deluxe>".into(),
            unit_price: dec!(12.50),
            qty: 2,
            line_total: dec!(25),
            created_at: Utc::now(),
        }];

        let html = render_receipt_html(&order, &items);
        assert!(html.contains("Widget &lt;deluxe&gt;"));
        assert!(html.contains("Total: 25 USD"));
    }
}
