use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{auth::AuthUser, extract::{ValidatedJson, ValidatedPath}, AppState, Envelope};
use crate::domain::aggregates::Role;
use crate::error::AppError;
use crate::services::CartView;

type CartResponse = Json<Envelope<CartView>>;

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product: Uuid,
    #[validate(range(min = 1, message = "Quantity must be an integer greater than 0."))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "Quantity must be an integer greater than 0."))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, message = "Coupon code is required."))]
    pub code: String,
}

pub async fn get(State(s): State<AppState>, user: AuthUser) -> Result<CartResponse, AppError> {
    let caller = user.require(&[Role::User])?;
    Ok(Envelope::json("success", s.cart.get_cart(caller.id).await?))
}

pub async fn add_item(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedJson(r): ValidatedJson<AddToCartRequest>,
) -> Result<(StatusCode, CartResponse), AppError> {
    let caller = user.require(&[Role::User])?;
    let cart = s.cart.add_item(caller.id, r.product, r.quantity).await?;
    Ok((StatusCode::CREATED, Envelope::json("Product added to cart successfully.", cart)))
}

pub async fn update_item(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedPath(item_id): ValidatedPath<Uuid>,
    ValidatedJson(r): ValidatedJson<UpdateCartItemRequest>,
) -> Result<CartResponse, AppError> {
    let caller = user.require(&[Role::User])?;
    Ok(Envelope::json("Cart item updated successfully.", s.cart.update_item(caller.id, item_id, r.quantity).await?))
}

pub async fn remove_item(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedPath(item_id): ValidatedPath<Uuid>,
) -> Result<CartResponse, AppError> {
    let caller = user.require(&[Role::User])?;
    Ok(Envelope::json("Cart item removed successfully.", s.cart.remove_item(caller.id, item_id).await?))
}

pub async fn apply_coupon(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedJson(r): ValidatedJson<ApplyCouponRequest>,
) -> Result<CartResponse, AppError> {
    let caller = user.require(&[Role::User])?;
    Ok(Envelope::json("Coupon applied successfully.", s.cart.apply_coupon(caller.id, r.code.trim()).await?))
}

pub async fn revoke_coupon(State(s): State<AppState>, user: AuthUser) -> Result<CartResponse, AppError> {
    let caller = user.require(&[Role::User])?;
    Ok(Envelope::json("Coupon revoked successfully.", s.cart.revoke_coupon(caller.id).await?))
}
