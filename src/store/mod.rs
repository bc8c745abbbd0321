//! Persistence.
//!
//! [`Store`] is the data-access seam the services depend on. [`PgStore`] backs
//! it with Postgres, [`MemoryStore`] keeps everything in process and is used
//! when no database is configured and in tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::aggregates::{Address, Cart, Coupon, NewOrder, Order, Product, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user `{0}` not found")]
    UserNotFound(Uuid),

    #[error("product `{0}` not found")]
    ProductNotFound(Uuid),

    #[error("not enough stock for product `{0}`")]
    InsufficientStock(Uuid),

    #[error("duplicate value for {0}")]
    Duplicate(&'static str),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Outcome of [`Store::place_order`].
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// The order was written, stock adjusted and the cart cleared.
    Created(Order),
    /// An order with the same idempotency key already existed; nothing was
    /// written.
    Duplicate(Order),
}

impl Placement {
    pub fn into_order(self) -> Order {
        match self { Self::Created(o) | Self::Duplicate(o) => o }
    }

    pub fn is_created(&self) -> bool { matches!(self, Self::Created(_)) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u32 { (self.page - 1) * self.limit }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

#[automock]
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: User) -> Result<User, StoreError>;

    /// Replaces the user's cart (items and coupon reference).
    async fn save_cart(&self, user_id: Uuid, cart: &Cart) -> Result<(), StoreError>;

    async fn add_address(&self, user_id: Uuid, address: Address) -> Result<Address, StoreError>;

    /// Returns `false` when the user has no such address.
    async fn remove_address(&self, user_id: Uuid, address_id: Uuid) -> Result<bool, StoreError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Fetches the products that exist among `ids`, in no particular order.
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError>;

    async fn insert_product(&self, product: Product) -> Result<Product, StoreError>;

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError>;

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon, StoreError>;

    /// Atomically bumps `usage_count` iff the coupon is unexpired at `now`
    /// and below `max_usage`. Returns whether a use was taken.
    async fn consume_coupon(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Atomically gives back one use, never going below zero.
    async fn release_coupon(&self, id: Uuid) -> Result<(), StoreError>;

    /// Commits an order as one unit: skips everything if the idempotency key
    /// was seen before, otherwise inserts the order, takes each line's
    /// quantity out of stock (failing the whole unit if any product is
    /// missing or short) and clears the owner's cart.
    async fn place_order(&self, order: NewOrder) -> Result<Placement, StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first, with the total number of matching orders.
    async fn list_orders(&self, filter: OrderFilter, page: Page) -> Result<(Vec<Order>, u64), StoreError>;

    async fn mark_order_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Order>, StoreError>;

    async fn mark_order_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Order>, StoreError>;
}
