use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, UpdateMany,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity},
        order_event::{self, ActiveModel as OrderEventActiveModel, Entity as OrderEventEntity},
        order_item::{self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity},
        product::{self, Entity as ProductEntity},
    },
    errors::ServiceError,
    models::OrderStatus,
};

use super::{NewOrder, OrderStore, ProductCatalog};

/// SeaORM-backed store over the hosted database.
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, new_order), fields(email = %new_order.email, items = new_order.items.len()))]
    async fn insert_order(&self, new_order: NewOrder) -> Result<order::Model, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_active_model = OrderActiveModel {
            id: Set(order_id),
            email: Set(new_order.email),
            status: Set(OrderStatus::Pending.to_string()),
            subtotal: Set(new_order.subtotal),
            tax: Set(new_order.tax),
            shipping: Set(new_order.shipping),
            total: Set(new_order.total),
            currency: Set(new_order.currency),
            stripe_session_id: Set(None),
            stripe_payment_intent_id: Set(None),
            shipping_address: Set(new_order.shipping_address),
            shipping_method: Set(new_order.shipping_method),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order row");
            ServiceError::DatabaseError(e)
        })?;

        for item in new_order.items {
            let item_active_model = OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                name: Set(item.name),
                unit_price: Set(item.unit_price),
                qty: Set(item.qty),
                line_total: Set(item.line_total),
                created_at: Set(now),
            };
            item_active_model.insert(&txn).await.map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert order item");
                ServiceError::DatabaseError(e)
            })?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "Order persisted");
        Ok(order_model)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(OrderEntity::find_by_id(id).one(&*self.db).await?)
    }

    async fn get_order_items(&self, id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn get_order_events(&self, id: Uuid) -> Result<Vec<order_event::Model>, ServiceError> {
        Ok(OrderEventEntity::find()
            .filter(order_event::Column::OrderId.eq(id))
            .order_by_asc(order_event::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::StripePaymentIntentId.eq(payment_intent_id))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self), fields(order_id = %id, to = %to))]
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        payment_intent_id: Option<&str>,
    ) -> Result<Option<order::Model>, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await?;

        // The guard lives in the UPDATE's WHERE clause, not in a prior
        // read: concurrent transitions serialize on the row lock and at
        // most one statement still sees a status in `from`.
        let result = guarded_transition_query(id, from, to).exec(&txn).await?;
        if result.rows_affected == 0 {
            txn.commit().await?;
            info!(order_id = %id, "Transition guard rejected; treating as no-op");
            return Ok(None);
        }

        if let Some(pi) = payment_intent_id {
            attach_payment_intent_query(id, pi).exec(&txn).await?;
        }

        let updated = OrderEntity::find_by_id(id).one(&txn).await?;
        txn.commit().await?;

        info!(order_id = %id, to = %to, "Order status transitioned");
        Ok(updated)
    }

    #[instrument(skip(self), fields(order_id = %id, to = %to))]
    async fn set_status(&self, id: Uuid, to: OrderStatus) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;

        let old_status = order.status.clone();
        let mut active: OrderActiveModel = order.into();
        active.status = Set(to.to_string());
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&*self.db).await?;
        info!(order_id = %id, old_status = %old_status, new_status = %to, "Order status overridden");
        Ok(updated)
    }

    async fn set_checkout_session(
        &self,
        id: Uuid,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let order = OrderEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;

        let mut active: OrderActiveModel = order.into();
        active.stripe_session_id = Set(Some(session_id.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;
        Ok(())
    }

    async fn append_event(
        &self,
        order_id: Uuid,
        event_type: &str,
        message: &str,
    ) -> Result<(), ServiceError> {
        let event = OrderEventActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            event_type: Set(event_type.to_string()),
            message: Set(message.to_string()),
            created_at: Set(Utc::now()),
        };
        event.insert(&*self.db).await?;
        Ok(())
    }

    async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }
}

/// Conditional status write. The `from` guard is a predicate of this one
/// UPDATE so the compare-and-set cannot be split by a concurrent writer.
fn guarded_transition_query(
    id: Uuid,
    from: &[OrderStatus],
    to: OrderStatus,
) -> UpdateMany<OrderEntity> {
    OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(to.to_string()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(id))
        .filter(order::Column::Status.is_in(from.iter().map(ToString::to_string)))
}

/// Writes the payment intent only while the column is still unset.
fn attach_payment_intent_query(id: Uuid, payment_intent_id: &str) -> UpdateMany<OrderEntity> {
    OrderEntity::update_many()
        .col_expr(
            order::Column::StripePaymentIntentId,
            Expr::value(payment_intent_id),
        )
        .filter(order::Column::Id.eq(id))
        .filter(order::Column::StripePaymentIntentId.is_null())
}

#[async_trait]
impl ProductCatalog for SeaOrmOrderStore {
    async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(ProductEntity::find()
            .filter(product::Column::Active.eq(true))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(ProductEntity::find_by_id(id).one(&*self.db).await?)
    }
}
