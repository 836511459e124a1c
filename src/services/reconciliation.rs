use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::OrderStatus;
use crate::services::receipts::{MailOutcome, Mailer};
use crate::store::{event_type, OrderStore};

/// Provider notification distilled to what reconciliation acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    CheckoutSessionCompleted {
        order_id: Option<Uuid>,
        payment_intent_id: Option<String>,
    },
    ChargeRefunded {
        payment_intent_id: Option<String>,
    },
    Ignored {
        event_kind: String,
    },
}

impl ProviderEvent {
    /// Extracts the actionable fields from a verified webhook payload.
    /// Unknown event kinds are kept (and acknowledged) as `Ignored`.
    pub fn parse(payload: &Value) -> Self {
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let object = payload.pointer("/data/object").unwrap_or(&Value::Null);

        match kind {
            "checkout.session.completed" => {
                let order_id = object
                    .pointer("/metadata/order_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok());
                let payment_intent_id = object
                    .get("payment_intent")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                ProviderEvent::CheckoutSessionCompleted {
                    order_id,
                    payment_intent_id,
                }
            }
            "charge.refunded" => ProviderEvent::ChargeRefunded {
                payment_intent_id: object
                    .get("payment_intent")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            other => ProviderEvent::Ignored {
                event_kind: other.to_string(),
            },
        }
    }
}

/// State transition a webhook produced, if any. `None` results are normal:
/// redeliveries, unknown references, and already-settled orders all land
/// there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    MarkedPaid(Uuid),
    MarkedRefunded(Uuid),
}

/// Applies verified provider events to order state. Every status write
/// goes through the store's compare-and-set so redelivered events are
/// no-ops rather than double transitions.
pub struct ReconciliationService {
    store: Arc<dyn OrderStore>,
    mailer: Arc<dyn Mailer>,
    event_sender: Option<Arc<EventSender>>,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        mailer: Arc<dyn Mailer>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            mailer,
            event_sender,
        }
    }

    #[instrument(skip(self, event))]
    pub async fn handle_provider_event(
        &self,
        event: ProviderEvent,
    ) -> Result<Option<Transition>, ServiceError> {
        match event {
            ProviderEvent::CheckoutSessionCompleted {
                order_id,
                payment_intent_id,
            } => self.mark_paid(order_id, payment_intent_id).await,
            ProviderEvent::ChargeRefunded { payment_intent_id } => {
                self.mark_refunded(payment_intent_id).await
            }
            ProviderEvent::Ignored { event_kind } => {
                info!(%event_kind, "Ignoring provider event");
                Ok(None)
            }
        }
    }

    async fn mark_paid(
        &self,
        order_id: Option<Uuid>,
        payment_intent_id: Option<String>,
    ) -> Result<Option<Transition>, ServiceError> {
        let Some(order_id) = order_id else {
            warn!("checkout.session.completed without a usable order_id in metadata");
            return Ok(None);
        };

        if self.store.get_order(order_id).await?.is_none() {
            warn!(%order_id, "checkout.session.completed for unknown order");
            return Ok(None);
        }

        let updated = self
            .store
            .transition_status(
                order_id,
                &[OrderStatus::Pending],
                OrderStatus::Paid,
                payment_intent_id.as_deref(),
            )
            .await?;

        let Some(order) = updated else {
            info!(%order_id, "Order already settled; redelivery treated as no-op");
            return Ok(None);
        };

        self.store
            .append_event(order_id, event_type::WEBHOOK, "Payment succeeded")
            .await?;

        self.emit(Event::PaymentSucceeded {
            order_id,
            payment_intent_id: order
                .stripe_payment_intent_id
                .clone()
                .unwrap_or_default(),
        })
        .await;

        // Receipt email is best-effort. Failures become audit events, not
        // webhook errors.
        match self.store.get_order_items(order_id).await {
            Ok(items) => match self.mailer.send_receipt(&order, &items).await {
                Ok(MailOutcome::Sent) => {
                    self.store
                        .append_event(
                            order_id,
                            event_type::EMAIL,
                            &format!("Receipt emailed to {}", order.email),
                        )
                        .await?;
                    self.emit(Event::ReceiptEmailed { order_id }).await;
                }
                Ok(MailOutcome::Disabled) => {
                    info!(%order_id, "Email disabled; receipt not sent");
                }
                Err(e) => {
                    warn!(%order_id, error = %e, "Receipt email failed");
                    self.store
                        .append_event(
                            order_id,
                            event_type::EMAIL,
                            &format!("Receipt email failed: {e}"),
                        )
                        .await?;
                }
            },
            Err(e) => {
                warn!(%order_id, error = %e, "Could not load items for receipt");
            }
        }

        Ok(Some(Transition::MarkedPaid(order_id)))
    }

    async fn mark_refunded(
        &self,
        payment_intent_id: Option<String>,
    ) -> Result<Option<Transition>, ServiceError> {
        let Some(payment_intent_id) = payment_intent_id else {
            warn!("charge.refunded without a payment intent reference");
            return Ok(None);
        };

        let Some(order) = self.store.find_by_payment_intent(&payment_intent_id).await? else {
            warn!(%payment_intent_id, "charge.refunded for unknown payment intent");
            return Ok(None);
        };

        let updated = self
            .store
            .transition_status(order.id, &[OrderStatus::Paid], OrderStatus::Refunded, None)
            .await?;

        if updated.is_none() {
            info!(order_id = %order.id, "Refund already applied; redelivery treated as no-op");
            return Ok(None);
        }

        self.store
            .append_event(order.id, event_type::WEBHOOK, "Charge refunded")
            .await?;
        self.emit(Event::PaymentRefunded { order_id: order.id }).await;

        Ok(Some(Transition::MarkedRefunded(order.id)))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to emit event");
            }
        }
    }
}
