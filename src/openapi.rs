use utoipa::OpenApi;

/// OpenAPI document served at `/api/v1/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Zenith Commerce API",
        description = "Order intake, payment reconciliation, and storefront reads",
        version = env!("CARGO_PKG_VERSION"),
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::invoice_pdf,
        crate::handlers::payment_webhooks::stripe_webhook,
        crate::handlers::wallet::wallet_callback,
        crate::handlers::admin::update_order_status,
        crate::handlers::admin::refund_order,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::health::health_check,
        crate::handlers::health::readiness_check,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::CreateOrderResponse,
        crate::services::orders::CartLine,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::OrderItemResponse,
        crate::handlers::orders::OrderEventResponse,
        crate::handlers::orders::OrderDetailResponse,
        crate::handlers::orders::PaginatedOrders,
        crate::handlers::admin::UpdateOrderStatusRequest,
        crate::handlers::products::ProductResponse,
        crate::models::OrderStatus,
    )),
    tags(
        (name = "orders", description = "Order intake and reads"),
        (name = "payments", description = "Provider webhooks and wallet callbacks"),
        (name = "admin", description = "Token-gated support operations"),
        (name = "products", description = "Storefront catalog"),
        (name = "health", description = "Probes"),
    )
)]
pub struct ApiDoc;
