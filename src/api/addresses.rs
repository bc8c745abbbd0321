use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{auth::AuthUser, extract::{ValidatedJson, ValidatedPath}, AppState, Envelope};
use crate::domain::aggregates::{Address, Role};
use crate::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct AddAddressRequest {
    #[validate(length(min = 1, message = "Alias is required."))]
    pub alias: String,
    #[validate(length(min = 1, max = 500, message = "City must be 1 to 500 characters."))]
    pub city: String,
    #[validate(length(min = 1, max = 500, message = "Details must be 1 to 500 characters."))]
    pub details: String,
}

pub async fn add(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedJson(r): ValidatedJson<AddAddressRequest>,
) -> Result<(StatusCode, Json<Envelope<Address>>), AppError> {
    let caller = user.require(&[Role::User])?;
    let address = s.addresses.add(caller.id, r.alias, r.city, r.details).await?;
    Ok((StatusCode::CREATED, Envelope::json("Address added successfully.", address)))
}

pub async fn list(State(s): State<AppState>, user: AuthUser) -> Result<Json<Envelope<Vec<Address>>>, AppError> {
    let caller = user.require(&[Role::User])?;
    Ok(Envelope::json("success", s.addresses.list(caller.id).await?))
}

pub async fn remove(
    State(s): State<AppState>,
    user: AuthUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> Result<StatusCode, AppError> {
    let caller = user.require(&[Role::User])?;
    s.addresses.remove(caller.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
