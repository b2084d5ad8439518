pub mod admin;
pub mod cards;
pub mod inventory;
pub mod verification;

use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
    routing::{delete, get, post, put},
};
use serde::Serialize;
use std::{convert::Infallible, net::SocketAddr};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Wraps a payload as `{"success": true, ...payload}`.
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

#[derive(Debug, Serialize)]
pub struct Done {}

/// Best known address of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.config.trust_forwarded_for {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(addr) = forwarded {
                return Ok(Self(addr.to_string()));
            }
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(Self(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Admin session
        .route("/api/admin/request-code", post(admin::request_code))
        .route("/api/admin/verify-code", post(admin::verify_code))
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/check-auth", get(admin::check_auth))
        .route("/api/admin/audit", get(admin::list_audit_events))
        // Card authorizations
        .route("/cards", post(cards::create_card).get(cards::list_cards))
        .route("/cards/{id}", delete(cards::delete_card))
        // Step-up verification
        .route("/verification/request", post(verification::request_verification))
        .route("/verification/verify", post(verification::verify_code))
        // Storefront and inventory
        .route("/api/products", get(inventory::list_products))
        .route("/api/available-products", get(inventory::list_available_products))
        .route("/api/admin/products", post(inventory::add_product))
        .route("/api/admin/products/{code}", delete(inventory::delete_product))
        .route("/api/admin/products/quantity", put(inventory::update_quantity))
        .route("/api/orders", post(inventory::place_order))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
