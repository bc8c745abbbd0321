//! Service-level errors and their HTTP rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::CartError;
use crate::domain::pricing::PricingError;
use crate::payments::{webhook::SignatureError, PaymentError};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("The address with the ID `{0}` does not exist.")]
    AddressNotFound(Uuid),

    #[error("Your cart is empty.")]
    EmptyCart,

    #[error("The product with the ID `{0}` does not exist.")]
    ProductNotFound(Uuid),

    #[error("The product with the ID `{0}` is no longer available.")]
    StaleCartItem(Uuid),

    #[error("The order with the ID `{0}` does not exist.")]
    OrderNotFound(Uuid),

    #[error("The cart item with the ID `{0}` does not exist.")]
    CartItemNotFound(Uuid),

    #[error("The coupon `{0}` does not exist.")]
    CouponNotFound(String),

    #[error("This item is already in your cart.")]
    DuplicateCartItem(Uuid),

    #[error("A coupon is already applied to your cart.")]
    CouponAlreadyApplied,

    #[error("No coupon is applied to your cart.")]
    NoCouponApplied,

    #[error("The coupon `{0}` is expired or has reached its usage limit.")]
    CouponNotApplicable(String),

    #[error("No enough quantity for the product `{0}`.")]
    NotEnoughQuantity(Uuid),

    #[error("The product `{0}` went out of stock.")]
    InsufficientStock(Uuid),

    #[error("Please login to access this route.")]
    Unauthorized,

    #[error("{0}")]
    InvalidToken(String),

    #[error("You're not authorized to access this route.")]
    Forbidden,

    #[error("Webhook signature verification failed: {0}")]
    InvalidWebhookSignature(#[from] SignatureError),

    #[error("Unhandled event type `{0}`.")]
    UnhandledEvent(String),

    #[error("Malformed webhook: {0}")]
    MalformedWebhook(String),

    #[error("Payment gateway error.")]
    PaymentGateway(#[source] PaymentError),

    #[error("Something went wrong.")]
    Store(#[source] StoreError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::EmptyCart
            | Self::NoCouponApplied
            | Self::CouponNotApplicable(_)
            | Self::NotEnoughQuantity(_)
            | Self::InvalidWebhookSignature(_)
            | Self::UnhandledEvent(_)
            | Self::MalformedWebhook(_) => StatusCode::BAD_REQUEST,
            Self::AddressNotFound(_)
            | Self::ProductNotFound(_)
            | Self::StaleCartItem(_)
            | Self::OrderNotFound(_)
            | Self::CartItemNotFound(_)
            | Self::CouponNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateCartItem(_) | Self::CouponAlreadyApplied | Self::InsufficientStock(_) => StatusCode::CONFLICT,
            Self::Unauthorized | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProductNotFound(id) => Self::ProductNotFound(id),
            StoreError::InsufficientStock(id) => Self::InsufficientStock(id),
            StoreError::UserNotFound(_) => Self::Unauthorized,
            other => Self::Store(other),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::StaleCartItem(id) => Self::StaleCartItem(id),
        }
    }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::DuplicateProduct(id) => Self::DuplicateCartItem(id),
            CartError::ItemNotFound(id) => Self::CartItemNotFound(id),
            CartError::InvalidQuantity(_) => Self::Validation(e.to_string()),
            CartError::CouponAlreadyApplied => Self::CouponAlreadyApplied,
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Metadata(reason) => Self::MalformedWebhook(reason),
            e @ PaymentError::MetadataTooLarge(_) => Self::Validation(e.to_string()),
            other => Self::PaymentGateway(other),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: &'static str,
    status_code: u16,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            status: if status.is_client_error() { "fail" } else { "error" },
            status_code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let id = Uuid::nil();
        assert_eq!(AppError::AddressNotFound(id).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::CouponAlreadyApplied.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::InsufficientStock(id).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::UnhandledEvent("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidWebhookSignature(SignatureError::Mismatch).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn store_errors_map_to_domain_failures() {
        let id = Uuid::nil();
        assert!(matches!(AppError::from(StoreError::InsufficientStock(id)), AppError::InsufficientStock(_)));
        assert!(matches!(AppError::from(StoreError::Corrupt("x".into())), AppError::Store(_)));
    }
}
