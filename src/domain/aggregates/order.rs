//! Order Aggregate
//!
//! Orders are written once and afterwards only move forward on two flags:
//! paid and delivered.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::user::ShippingAddress;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub shipping_address: ShippingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A priced line. `price` is the unit price at the time the order was placed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cash => "cash", Self::Card => "card" }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            other => Err(format!("unknown payment method `{other}`")),
        }
    }
}

/// Everything needed to persist an order; ids and timestamps are assigned by
/// [`NewOrder::into_order`].
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipping_address: ShippingAddress,
    pub idempotency_key: Option<String>,
}

impl NewOrder {
    pub fn into_order(self, now: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::now_v7(),
            user_id: self.user_id,
            items: self.items,
            subtotal: self.subtotal,
            discount: self.discount,
            shipping_cost: self.shipping_cost,
            total_amount: self.total_amount,
            payment_method: self.payment_method,
            is_paid: self.paid_at.is_some(),
            paid_at: self.paid_at,
            is_delivered: false,
            delivered_at: None,
            shipping_address: self.shipping_address,
            idempotency_key: self.idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Order {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    /// Marks the order paid. Paying twice keeps the first timestamp.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) {
        if !self.is_paid {
            self.is_paid = true;
            self.paid_at = Some(at);
            self.updated_at = at;
        }
    }

    /// Marks the order delivered. Delivering twice keeps the first timestamp.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) {
        if !self.is_delivered {
            self.is_delivered = true;
            self.delivered_at = Some(at);
            self.updated_at = at;
        }
    }
}
