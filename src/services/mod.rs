//! Application services: the workflows behind the HTTP handlers.

pub mod addresses;
pub mod cart;
pub mod orders;

pub use addresses::AddressService;
pub use cart::{CartLine, CartService, CartView};
pub use orders::{OrderDetails, OrderLine, OrderService, Reconciled};

use uuid::Uuid;

use crate::domain::aggregates::{Role, User};
use crate::error::AppError;
use crate::store::Store;

/// The authenticated principal a service call acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Loads the caller's user record; a token for a deleted user is treated as
/// no login at all.
pub(crate) async fn load_user(store: &dyn Store, user_id: Uuid) -> Result<User, AppError> {
    store.get_user(user_id).await?.ok_or(AppError::Unauthorized)
}
