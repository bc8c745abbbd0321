//! HTTP surface.

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod extract;
pub mod orders;

use axum::{
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::messaging::EventPublisher;
use crate::payments::PaymentGateway;
use crate::services::{AddressService, CartService, OrderService};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub cart: CartService,
    pub addresses: AddressService,
    pub orders: OrderService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            cart: CartService::new(store.clone()),
            addresses: AddressService::new(store.clone()),
            orders: OrderService::new(store.clone(), gateway, publisher, config.clone()),
            config,
            store,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: &'static str,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn json(message: &'static str, data: T) -> Json<Self> { Json(Self { message, data }) }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .route("/orders", get(orders::list))
        .route("/orders/cash-order", post(orders::place_cash_order))
        .route("/orders/checkout-session", post(orders::create_checkout_session))
        .route("/orders/card-order", post(orders::card_webhook))
        .route("/orders/:id", get(orders::get))
        .route("/orders/:id/set-as-paid", patch(orders::mark_paid))
        .route("/orders/:id/set-as-delivered", patch(orders::mark_delivered))
        .route("/cart", get(cart::get).post(cart::add_item))
        .route("/cart/apply-coupon", post(cart::apply_coupon))
        .route("/cart/revoke-coupon", post(cart::revoke_coupon))
        .route("/cart/:item_id", patch(cart::update_item).delete(cart::remove_item))
        .route("/addresses", get(addresses::list).post(addresses::add))
        .route("/addresses/:id", delete(addresses::remove))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
