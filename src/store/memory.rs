use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    entities::{order, order_event, order_item, product},
    errors::ServiceError,
    models::OrderStatus,
};

use super::{NewOrder, OrderStore, ProductCatalog};

#[derive(Default)]
struct StoreInner {
    orders: HashMap<Uuid, order::Model>,
    items: HashMap<Uuid, Vec<order_item::Model>>,
    events: HashMap<Uuid, Vec<order_event::Model>>,
    products: HashMap<Uuid, product::Model>,
}

/// In-memory store used by tests and local demos. Mirrors the guarded-write
/// semantics of [`super::SeaOrmOrderStore`] without a database.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a catalog row for storefront read tests.
    pub async fn seed_product(&self, model: product::Model) {
        self.inner.write().await.products.insert(model.id, model);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, new_order: NewOrder) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let model = order::Model {
            id: order_id,
            email: new_order.email,
            status: OrderStatus::Pending.to_string(),
            subtotal: new_order.subtotal,
            tax: new_order.tax,
            shipping: new_order.shipping,
            total: new_order.total,
            currency: new_order.currency,
            stripe_session_id: None,
            stripe_payment_intent_id: None,
            shipping_address: new_order.shipping_address,
            shipping_method: new_order.shipping_method,
            created_at: now,
            updated_at: Some(now),
        };

        let items = new_order
            .items
            .into_iter()
            .map(|item| order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                product_id: item.product_id,
                name: item.name,
                unit_price: item.unit_price,
                qty: item.qty,
                line_total: item.line_total,
                created_at: now,
            })
            .collect();

        let mut inner = self.inner.write().await;
        inner.orders.insert(order_id, model.clone());
        inner.items.insert(order_id, items);
        inner.events.insert(order_id, Vec::new());
        Ok(model)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn get_order_items(&self, id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(self
            .inner
            .read()
            .await
            .items
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_order_events(&self, id: Uuid) -> Result<Vec<order_event::Model>, ServiceError> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(self
            .inner
            .read()
            .await
            .orders
            .values()
            .find(|o| o.stripe_payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        payment_intent_id: Option<&str>,
    ) -> Result<Option<order::Model>, ServiceError> {
        let mut inner = self.inner.write().await;
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(None);
        };

        let current_status = OrderStatus::parse(&order.status)?;
        if !from.contains(&current_status) {
            return Ok(None);
        }

        order.status = to.to_string();
        order.updated_at = Some(Utc::now());
        if let Some(pi) = payment_intent_id {
            if order.stripe_payment_intent_id.is_none() {
                order.stripe_payment_intent_id = Some(pi.to_string());
            }
        }
        Ok(Some(order.clone()))
    }

    async fn set_status(&self, id: Uuid, to: OrderStatus) -> Result<order::Model, ServiceError> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        order.status = to.to_string();
        order.updated_at = Some(Utc::now());
        Ok(order.clone())
    }

    async fn set_checkout_session(
        &self,
        id: Uuid,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        order.stripe_session_id = Some(session_id.to_string());
        order.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn append_event(
        &self,
        order_id: Uuid,
        event_type: &str,
        message: &str,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.write().await;
        inner
            .events
            .entry(order_id)
            .or_default()
            .push(order_event::Model {
                id: Uuid::new_v4(),
                order_id,
                event_type: event_type.to_string(),
                message: message.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let inner = self.inner.read().await;
        let mut orders: Vec<order::Model> = inner.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = orders.len() as u64;
        let per_page = per_page.max(1) as usize;
        let start = (page.saturating_sub(1) as usize) * per_page;
        let page_items = orders.into_iter().skip(start).take(per_page).collect();
        Ok((page_items, total))
    }
}

#[async_trait]
impl ProductCatalog for InMemoryOrderStore {
    async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        let inner = self.inner.read().await;
        let mut products: Vec<product::Model> =
            inner.products.values().filter(|p| p.active).cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewOrderItem;
    use rust_decimal_macros::dec;

    fn sample_order() -> NewOrder {
        NewOrder {
            email: "buyer@example.com".into(),
            currency: "USD".into(),
            subtotal: dec!(25),
            tax: dec!(0),
            shipping: dec!(0),
            total: dec!(25),
            shipping_address: None,
            shipping_method: None,
            items: vec![NewOrderItem {
                product_id: Uuid::new_v4(),
                name: "Widget".into(),
                unit_price: dec!(12.50),
                qty: 2,
                line_total: dec!(25),
            }],
        }
    }

    #[tokio::test]
    async fn transition_guard_rejects_unexpected_current_status() {
        let store = InMemoryOrderStore::new();
        let order = store.insert_order(sample_order()).await.unwrap();

        let first = store
            .transition_status(order.id, &[OrderStatus::Pending], OrderStatus::Paid, Some("pi_1"))
            .await
            .unwrap();
        assert!(first.is_some());

        // Second delivery of the same event is a no-op.
        let second = store
            .transition_status(order.id, &[OrderStatus::Pending], OrderStatus::Paid, Some("pi_1"))
            .await
            .unwrap();
        assert!(second.is_none());

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "paid");
        assert_eq!(stored.stripe_payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn payment_intent_is_set_then_fixed() {
        let store = InMemoryOrderStore::new();
        let order = store.insert_order(sample_order()).await.unwrap();

        store
            .transition_status(order.id, &[OrderStatus::Pending], OrderStatus::Paid, Some("pi_1"))
            .await
            .unwrap();
        store
            .transition_status(order.id, &[OrderStatus::Paid], OrderStatus::Refunded, Some("pi_2"))
            .await
            .unwrap();

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.stripe_payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn events_are_append_only_and_ordered() {
        let store = InMemoryOrderStore::new();
        let order = store.insert_order(sample_order()).await.unwrap();

        store
            .append_event(order.id, "webhook", "Payment succeeded")
            .await
            .unwrap();
        store
            .append_event(order.id, "email", "send failed: timeout")
            .await
            .unwrap();

        let events = store.get_order_events(order.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "webhook");
        assert_eq!(events[1].event_type, "email");
    }
}
