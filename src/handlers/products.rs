use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = f64)]
    pub price: Decimal,
    pub currency: String,
    pub stock: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(m: product::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            price: m.price,
            currency: m.currency,
            stock: m.stock,
            active: m.active,
            created_at: m.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses((status = 200, description = "Active products", body = [ProductResponse])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductResponse>>, ServiceError> {
    let products = state.services.catalog.list_products().await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product detail", body = ProductResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>, ServiceError> {
    let product = state
        .services
        .catalog
        .get_product(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {id} not found")))?;
    Ok(Json(product.into()))
}
