use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{
    auth::AuthUser,
    extract::{ValidatedJson, ValidatedPath, ValidatedQuery},
    AppState, Envelope, PaginatedResponse,
};
use crate::domain::aggregates::Role;
use crate::error::AppError;
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::payments::CheckoutSession;
use crate::services::OrderDetails;
use crate::store::Page;

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    /// Id of an entry in the caller's address book.
    pub address: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn place_cash_order(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedJson(r): ValidatedJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Envelope<OrderDetails>>), AppError> {
    let caller = user.require(&[Role::User])?;
    let order = s.orders.place_cash_order(caller.id, r.address).await?;
    Ok((StatusCode::CREATED, Envelope::json("Order created successfully.", order)))
}

pub async fn create_checkout_session(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedJson(r): ValidatedJson<PlaceOrderRequest>,
) -> Result<Json<Envelope<CheckoutSession>>, AppError> {
    let caller = user.require(&[Role::User])?;
    let session = s.orders.create_checkout_session(caller.id, r.address).await?;
    Ok(Envelope::json("Checkout session created successfully.", session))
}

/// Called by the payment gateway, not by users. The body must reach the
/// signature check byte for byte, hence `Bytes` rather than `Json`.
pub async fn card_webhook(
    State(s): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let reconciled = s.orders.reconcile_webhook(&body, signature).await?;
    let (status, message) = if reconciled.created {
        (StatusCode::CREATED, "Order created successfully.")
    } else {
        (StatusCode::OK, "Order already recorded for this checkout.")
    };
    Ok((status, Envelope::json(message, reconciled.order)))
}

pub async fn list(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedQuery(p): ValidatedQuery<ListParams>,
) -> Result<Json<PaginatedResponse<OrderDetails>>, AppError> {
    let caller = user.require(&[Role::User, Role::Admin])?;
    let page = Page::new(p.page, p.limit);
    let (data, total) = s.orders.list_orders(caller, page).await?;
    Ok(Json(PaginatedResponse { data, total, page: page.page }))
}

pub async fn get(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Envelope<OrderDetails>>, AppError> {
    let caller = user.require(&[Role::User, Role::Admin])?;
    Ok(Envelope::json("success", s.orders.get_order(caller, id).await?))
}

pub async fn mark_paid(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Envelope<OrderDetails>>, AppError> {
    user.require(&[Role::Admin])?;
    Ok(Envelope::json("Order marked as paid.", s.orders.mark_paid(id).await?))
}

pub async fn mark_delivered(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<Json<Envelope<OrderDetails>>, AppError> {
    user.require(&[Role::Admin])?;
    Ok(Envelope::json("Order marked as delivered.", s.orders.mark_delivered(id).await?))
}
