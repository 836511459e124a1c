use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{order, order_event, order_item};
use crate::errors::ServiceError;
use crate::services::invoicing::InvoiceRenderer;
use crate::services::orders::{CreateOrderRequest, CreateOrderResponse};
use crate::services::payments::constant_time_eq;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/invoice.pdf", get(invoice_pdf))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub email: String,
    pub status: String,
    #[schema(value_type = f64)]
    pub subtotal: Decimal,
    #[schema(value_type = f64)]
    pub tax: Decimal,
    #[schema(value_type = f64)]
    pub shipping: Decimal,
    #[schema(value_type = f64)]
    pub total: Decimal,
    pub currency: String,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<order::Model> for OrderResponse {
    fn from(m: order::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            status: m.status,
            subtotal: m.subtotal,
            tax: m.tax,
            shipping: m.shipping,
            total: m.total,
            currency: m.currency,
            stripe_session_id: m.stripe_session_id,
            stripe_payment_intent_id: m.stripe_payment_intent_id,
            shipping_address: m.shipping_address,
            shipping_method: m.shipping_method,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    #[schema(value_type = f64)]
    pub unit_price: Decimal,
    pub qty: i32,
    #[schema(value_type = f64)]
    pub line_total: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(m: order_item::Model) -> Self {
        Self {
            id: m.id,
            product_id: m.product_id,
            name: m.name,
            unit_price: m.unit_price,
            qty: m.qty,
            line_total: m.line_total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderEventResponse {
    pub event_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<order_event::Model> for OrderEventResponse {
    fn from(m: order_event::Model) -> Self {
        Self {
            event_type: m.event_type,
            message: m.message,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
    pub events: Vec<OrderEventResponse>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedOrders {
    pub items: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Creates a pending order from the submitted cart and, when a payment
/// provider is configured, returns the hosted checkout URL.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "Page of orders", body = PaginatedOrders)),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaginatedOrders>, ServiceError> {
    let per_page = query.per_page.clamp(1, 100);
    let (orders, total) = state.services.orders.list_orders(query.page, per_page).await?;
    Ok(Json(PaginatedOrders {
        items: orders.into_iter().map(OrderResponse::from).collect(),
        total,
        page: query.page,
        per_page,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items and audit trail", body = OrderDetailResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetailResponse>, ServiceError> {
    let (order, items, events) = state.services.orders.get_order_detail(id).await?;
    Ok(Json(OrderDetailResponse {
        order: order.into(),
        items: items.into_iter().map(OrderItemResponse::from).collect(),
        events: events.into_iter().map(OrderEventResponse::from).collect(),
    }))
}

/// Renders the order invoice as a PDF. Readable by anyone holding the
/// opaque order UUID; a valid admin token is noted for audit logging.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice.pdf",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Invoice PDF", body = Vec<u8>, content_type = "application/pdf"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn invoice_pdf(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items, _) = state.services.orders.get_order_detail(id).await?;

    if let (Some(expected), Some(provided)) = (
        state.config.admin_api_token.as_deref(),
        headers.get("x-admin-token").and_then(|v| v.to_str().ok()),
    ) {
        if constant_time_eq(expected, provided) {
            debug!(order_id = %id, "Invoice fetched with admin credentials");
        }
    }

    let bytes = InvoiceRenderer::render_pdf(&order, &items)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"invoice-{id}.pdf\""),
            ),
        ],
        bytes,
    ))
}
