use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::{order, order_event, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::OrderStatus;
use crate::services::payments::StripeClient;
use crate::store::{event_type, NewOrder, NewOrderItem, OrderStore};

/// One cart line as submitted by the storefront. Prices are trusted as
/// submitted; catalog reconciliation is handled upstream.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Item name must not be empty"))]
    pub name: String,
    #[validate(custom = "validate_price")]
    #[schema(value_type = f64, example = 12.50)]
    pub price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub qty: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CartLine>,
    pub shipping_address: Option<String>,
    pub shipping_method: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    /// Hosted checkout URL. Absent when no payment provider is configured.
    pub checkout_url: Option<String>,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("price_negative"));
    }
    Ok(())
}

/// Checkout URLs and currency applied to every created order.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Order intake, reads, and admin mutations. Webhook-driven transitions
/// live in [`super::reconciliation`].
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    stripe: Option<Arc<StripeClient>>,
    event_sender: Option<Arc<EventSender>>,
    settings: CheckoutSettings,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        stripe: Option<Arc<StripeClient>>,
        event_sender: Option<Arc<EventSender>>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            stripe,
            event_sender,
            settings,
        }
    }

    /// Validates the cart, persists the order as `pending`, then opens a
    /// hosted checkout session when a provider is configured. The order
    /// survives a failed session creation; the provider error is surfaced
    /// so the client can retry checkout.
    #[instrument(skip(self, request), fields(email = %request.email, items = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        request.validate()?;

        let mut subtotal = Decimal::ZERO;
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            line.validate()?;
            let line_total = line.price * Decimal::from(line.qty);
            subtotal += line_total;
            items.push(NewOrderItem {
                product_id: line.product_id,
                name: line.name.clone(),
                unit_price: line.price,
                qty: line.qty,
                line_total,
            });
        }

        // Tax and shipping are flat zero for now; totals are still stored
        // as separate columns so the pricing model can grow without a
        // schema change.
        let tax = Decimal::ZERO;
        let shipping = Decimal::ZERO;
        let total = subtotal + tax + shipping;

        let order = self
            .store
            .insert_order(NewOrder {
                email: request.email,
                currency: self.settings.currency.clone(),
                subtotal,
                tax,
                shipping,
                total,
                shipping_address: request.shipping_address,
                shipping_method: request.shipping_method,
                items: items.clone(),
            })
            .await?;

        self.emit(Event::OrderCreated(order.id)).await;

        let checkout_url = match &self.stripe {
            Some(stripe) => {
                let (session_id, url) = stripe
                    .create_checkout_session(
                        order.id,
                        &order.currency,
                        &items,
                        &self.settings.success_url,
                        &self.settings.cancel_url,
                    )
                    .await
                    .map_err(|e| {
                        error!(order_id = %order.id, error = %e, "Checkout session creation failed");
                        e
                    })?;
                self.store.set_checkout_session(order.id, &session_id).await?;
                Some(url)
            }
            None => {
                info!(order_id = %order.id, "No payment provider configured; order created without checkout");
                None
            }
        };

        Ok(CreateOrderResponse {
            order_id: order.id,
            checkout_url,
        })
    }

    /// Fetches the order with its items and audit trail.
    pub async fn get_order_detail(
        &self,
        id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>, Vec<order_event::Model>), ServiceError>
    {
        let (order, items, events) = futures::try_join!(
            self.store.get_order(id),
            self.store.get_order_items(id),
            self.store.get_order_events(id),
        )?;
        let order = order.ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        Ok((order, items, events))
    }

    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        self.store.list_orders(page, per_page).await
    }

    /// Forces an order into `status`, bypassing the transition table. The
    /// write is always audited with the old and new status and the actor.
    #[instrument(skip(self), fields(order_id = %id, %status, %actor))]
    pub async fn override_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        actor: &str,
    ) -> Result<order::Model, ServiceError> {
        let current = self
            .store
            .get_order(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        let old_status = current.status.clone();

        let updated = self.store.set_status(id, status).await?;
        self.store
            .append_event(
                id,
                event_type::MANUAL_ACTION,
                &format!("Status override {old_status} -> {status} by {actor}"),
            )
            .await?;

        self.emit(Event::OrderStatusChanged {
            order_id: id,
            old_status,
            new_status: status.to_string(),
        })
        .await;

        Ok(updated)
    }

    /// Initiates a provider-side refund for a paid order. Does not change
    /// the order status; the `charge.refunded` webhook is the sole writer
    /// of the refunded state.
    #[instrument(skip(self), fields(order_id = %id, %actor))]
    pub async fn initiate_refund(
        &self,
        id: Uuid,
        actor: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self
            .store
            .get_order(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;

        let status = OrderStatus::parse(&order.status)?;
        if status != OrderStatus::Paid {
            return Err(ServiceError::InvalidState(format!(
                "Order is {status}; refund requires a paid order"
            )));
        }

        let payment_intent_id = order.stripe_payment_intent_id.as_deref().ok_or_else(|| {
            ServiceError::MissingReference(format!("Order {id} has no payment intent on record"))
        })?;

        let stripe = self.stripe.as_ref().ok_or_else(|| {
            ServiceError::ConfigurationError("stripe_secret_key is not configured".to_string())
        })?;

        stripe.refund_payment_intent(payment_intent_id).await?;

        self.store
            .append_event(
                id,
                event_type::MANUAL_ACTION,
                &format!("Refund initiated for {payment_intent_id} by {actor}"),
            )
            .await?;

        info!(order_id = %id, "Refund initiated; awaiting charge.refunded webhook");
        Ok(order)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to emit event");
            }
        }
    }
}
