//! Storefront
//!
//! Order placement for an e-commerce backend: carts priced into immutable
//! orders, with stock taken and the cart cleared in the same commit.
//!
//! ## Features
//! - Cart management with at most one coupon per cart
//! - Cash orders
//! - Card orders through a hosted checkout and its signed webhook
//! - Idempotent webhook reconciliation
//! - Admin paid/delivered transitions
//! - Postgres or in-memory storage

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod payments;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::AppError;
