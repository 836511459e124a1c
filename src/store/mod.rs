//! Persistence capability for orders and the read-mostly catalog.
//!
//! The hosted database is the sole owner of all entities; handlers and
//! services reach it exclusively through these traits so reconciliation and
//! admin logic can be exercised against [`memory::InMemoryOrderStore`]
//! without a live database.

pub mod memory;
pub mod seaorm;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    entities::{order, order_event, order_item, product},
    errors::ServiceError,
    models::OrderStatus,
};

pub use memory::InMemoryOrderStore;
pub use seaorm::SeaOrmOrderStore;

/// Audit event tags. Free-form in the schema; these are the ones this
/// service writes.
pub mod event_type {
    pub const WEBHOOK: &str = "webhook";
    pub const EMAIL: &str = "email";
    pub const STATUS_CHANGE: &str = "status_change";
    pub const MANUAL_ACTION: &str = "manual_action";
}

/// A fully validated order ready for persistence.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub email: String,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub shipping_address: Option<String>,
    pub shipping_method: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub qty: i32,
    pub line_total: Decimal,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order and all of its items in a single transaction.
    async fn insert_order(&self, order: NewOrder) -> Result<order::Model, ServiceError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError>;

    async fn get_order_items(&self, id: Uuid) -> Result<Vec<order_item::Model>, ServiceError>;

    async fn get_order_events(&self, id: Uuid) -> Result<Vec<order_event::Model>, ServiceError>;

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<order::Model>, ServiceError>;

    /// Compare-and-set status transition: writes `to` only when the current
    /// status is one of `from`, returning `Ok(None)` otherwise. When
    /// `payment_intent_id` is given it is attached in the same write, and
    /// only if the column is still unset.
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        payment_intent_id: Option<&str>,
    ) -> Result<Option<order::Model>, ServiceError>;

    /// Unconditional status write used by the admin override path. Callers
    /// are expected to append an audit event alongside.
    async fn set_status(&self, id: Uuid, to: OrderStatus) -> Result<order::Model, ServiceError>;

    async fn set_checkout_session(&self, id: Uuid, session_id: &str)
        -> Result<(), ServiceError>;

    /// Appends an audit event. Append-only; events are never mutated.
    async fn append_event(
        &self,
        order_id: Uuid,
        event_type: &str,
        message: &str,
    ) -> Result<(), ServiceError>;

    /// Newest-first page of orders plus the total count.
    async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError>;
}

/// Read access to the product catalog consumed by the storefront.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError>;
}
