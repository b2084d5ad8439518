use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    app_state::AppState,
    db::models::Product,
    error::AppResult,
    handlers::{Done, Success},
    inventory::NewOrder,
    session::AdminSession,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    product_code: String,
    quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedProduct {
    pub product: Product,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: i64,
}

/// GET /api/products
pub async fn list_products(
    State(state): State<AppState>,
    _session: AdminSession,
) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(state.inventory.list().await?))
}

/// GET /api/available-products
pub async fn list_available_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(state.inventory.list_available().await?))
}

/// POST /api/admin/products
pub async fn add_product(
    State(state): State<AppState>,
    _session: AdminSession,
    Json(req): Json<ProductRequest>,
) -> AppResult<Json<Success<Done>>> {
    state.inventory.add(&req.product_code, req.quantity).await?;
    Ok(Success::new(Done {}))
}

/// DELETE /api/admin/products/{code}
pub async fn delete_product(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(code): Path<String>,
) -> AppResult<Json<Success<Done>>> {
    state.inventory.delete(&code).await?;
    Ok(Success::new(Done {}))
}

/// PUT /api/admin/products/quantity
pub async fn update_quantity(
    State(state): State<AppState>,
    _session: AdminSession,
    Json(req): Json<ProductRequest>,
) -> AppResult<Json<Success<UpdatedProduct>>> {
    let product = state.inventory.set_quantity(&req.product_code, req.quantity).await?;
    Ok(Success::new(UpdatedProduct { product }))
}

/// POST /api/orders
pub async fn place_order(
    State(state): State<AppState>,
    Json(order): Json<NewOrder>,
) -> AppResult<Json<Success<PlacedOrder>>> {
    let order_id = state.inventory.place_order(&order).await?;
    Ok(Success::new(PlacedOrder { order_id }))
}
