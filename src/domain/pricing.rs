//! Pricing engine.
//!
//! Turns a cart snapshot into priced order lines and totals. Pure: the caller
//! resolves products and the coupon and passes the evaluation time in.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::aggregates::{CartItem, Coupon, OrderItem, Product};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Lines in cart order, each carrying the unit price in effect now.
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    /// Percentage taken off the subtotal, 0 when no valid coupon applies.
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
}

impl Quote {
    pub fn discount_amount(&self) -> Decimal { discount_amount(self.subtotal, self.discount) }

    pub fn discounted_subtotal(&self) -> Decimal { self.subtotal - self.discount_amount() }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("The product with the ID `{0}` does not exist.")]
    StaleCartItem(Uuid),
}

/// Exact; amounts are only rounded when converted to the gateway's minor units.
fn discount_amount(subtotal: Decimal, discount: Decimal) -> Decimal {
    subtotal * discount / Decimal::ONE_HUNDRED
}

/// Prices `items` against `products`.
///
/// The coupon only counts if it has not expired at `now`; it may have been
/// valid when it was applied to the cart and lapsed since.
pub fn price(
    items: &[CartItem],
    products: &HashMap<Uuid, Product>,
    coupon: Option<&Coupon>,
    shipping_cost: Decimal,
    now: DateTime<Utc>,
) -> Result<Quote, PricingError> {
    let lines = items
        .iter()
        .map(|item| {
            let product = products.get(&item.product_id).ok_or(PricingError::StaleCartItem(item.product_id))?;
            Ok(OrderItem { product: item.product_id, quantity: item.quantity, price: product.effective_price() })
        })
        .collect::<Result<Vec<_>, PricingError>>()?;

    let discount = coupon.filter(|c| !c.is_expired(now)).map(|c| c.discount.value()).unwrap_or(Decimal::ZERO);

    Ok(total(lines, discount, shipping_cost))
}

/// Totals already priced lines: `subtotal - subtotal * discount / 100 + shipping`.
pub fn total(items: Vec<OrderItem>, discount: Decimal, shipping_cost: Decimal) -> Quote {
    let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
    let total_amount = (subtotal - discount_amount(subtotal, discount)).max(Decimal::ZERO) + shipping_cost;
    Quote { items, subtotal, discount, shipping_cost, total_amount }
}
