//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartError, CartItem};
pub use coupon::{Coupon, CouponSummary};
pub use order::{NewOrder, Order, OrderItem, PaymentMethod};
pub use product::{Product, ProductSummary};
pub use user::{Address, Role, ShippingAddress, User, UserSummary};
