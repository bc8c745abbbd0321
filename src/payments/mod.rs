//! Card payments: hosted checkout sessions and their completion webhooks.

pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::aggregates::{NewOrder, OrderItem, PaymentMethod, ShippingAddress};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment gateway rejected the request ({status}): {message}")]
    Gateway { status: u16, message: String },

    #[error("payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("checkout metadata: {0}")]
    Metadata(String),

    #[error("The order does not fit in a checkout session: {0}")]
    MetadataTooLarge(String),
}

/// Gateway limits on session metadata.
pub const METADATA_MAX_KEYS: usize = 50;
pub const METADATA_MAX_VALUE_LEN: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    /// Unit amount in minor currency units.
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutSessionRequest {
    pub customer_email: String,
    pub client_reference_id: String,
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError>;
}

/// The order-to-be, carried through the gateway in the session metadata and
/// handed back in the completion webhook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutMetadata {
    /// Minted per checkout session; becomes the order's idempotency key.
    pub order_token: String,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub shipping_address: ShippingAddress,
}

/// Order lines are written as `product:quantity:price`, comma separated and
/// packed into as few `items_<n>` values as the value limit allows.
impl CheckoutMetadata {
    pub fn to_map(&self) -> Result<BTreeMap<String, String>, PaymentError> {
        let mut map = BTreeMap::from([
            ("order_token".to_owned(), self.order_token.clone()),
            ("user_id".to_owned(), self.user_id.to_string()),
            ("subtotal".to_owned(), self.subtotal.to_string()),
            ("discount".to_owned(), self.discount.to_string()),
            ("shipping_cost".to_owned(), self.shipping_cost.to_string()),
            ("total_amount".to_owned(), self.total_amount.to_string()),
            ("city".to_owned(), self.shipping_address.city.clone()),
            ("details".to_owned(), self.shipping_address.details.clone()),
        ]);
        if let Some((key, _)) = map.iter().find(|(_, v)| v.len() > METADATA_MAX_VALUE_LEN) {
            return Err(PaymentError::MetadataTooLarge(format!("`{key}` is longer than {METADATA_MAX_VALUE_LEN} characters")));
        }

        for (n, chunk) in pack_items(&self.items).into_iter().enumerate() {
            map.insert(format!("items_{n}"), chunk);
        }
        if map.len() > METADATA_MAX_KEYS {
            return Err(PaymentError::MetadataTooLarge(format!("{} order lines are too many", self.items.len())));
        }
        Ok(map)
    }

    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, PaymentError> {
        fn field<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, PaymentError> {
            map.get(key).map(String::as_str).ok_or_else(|| PaymentError::Metadata(format!("missing `{key}`")))
        }
        fn decimal(map: &BTreeMap<String, String>, key: &str) -> Result<Decimal, PaymentError> {
            field(map, key)?.parse().map_err(|e| PaymentError::Metadata(format!("`{key}`: {e}")))
        }

        let user_id = field(map, "user_id")?.parse().map_err(|e| PaymentError::Metadata(format!("`user_id`: {e}")))?;
        let mut items = Vec::new();
        for chunk in (0..).map_while(|n| map.get(&format!("items_{n}"))) {
            for line in chunk.split(',') {
                items.push(parse_item(line)?);
            }
        }
        if items.is_empty() {
            return Err(PaymentError::Metadata("missing order lines".into()));
        }
        Ok(Self {
            order_token: field(map, "order_token")?.to_owned(),
            user_id,
            items,
            subtotal: decimal(map, "subtotal")?,
            discount: decimal(map, "discount")?,
            shipping_cost: decimal(map, "shipping_cost")?,
            total_amount: decimal(map, "total_amount")?,
            shipping_address: ShippingAddress { city: field(map, "city")?.to_owned(), details: field(map, "details")?.to_owned() },
        })
    }

    /// The paid card order this checkout turns into.
    pub fn into_new_order(self, paid_at: DateTime<Utc>) -> NewOrder {
        NewOrder {
            user_id: self.user_id,
            items: self.items,
            subtotal: self.subtotal,
            discount: self.discount,
            shipping_cost: self.shipping_cost,
            total_amount: self.total_amount,
            payment_method: PaymentMethod::Card,
            paid_at: Some(paid_at),
            shipping_address: self.shipping_address,
            idempotency_key: Some(self.order_token),
        }
    }
}

fn pack_items(items: &[OrderItem]) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    for item in items {
        let line = format!("{}:{}:{}", item.product, item.quantity, item.price);
        match chunks.last_mut() {
            Some(chunk) if chunk.len() + 1 + line.len() <= METADATA_MAX_VALUE_LEN => {
                chunk.push(',');
                chunk.push_str(&line);
            }
            _ => chunks.push(line),
        }
    }
    chunks
}

fn parse_item(line: &str) -> Result<OrderItem, PaymentError> {
    let malformed = || PaymentError::Metadata(format!("malformed order line `{line}`"));
    let mut parts = line.split(':');
    let (Some(product), Some(quantity), Some(price), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    Ok(OrderItem {
        product: product.parse().map_err(|_| malformed())?,
        quantity: quantity.parse().map_err(|_| malformed())?,
        price: price.parse().map_err(|_| malformed())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metadata() -> CheckoutMetadata {
        CheckoutMetadata {
            order_token: "tok_123".into(),
            user_id: Uuid::now_v7(),
            items: vec![OrderItem { product: Uuid::now_v7(), quantity: 2, price: dec!(100) }],
            subtotal: dec!(200),
            discount: dec!(10),
            shipping_cost: dec!(50),
            total_amount: dec!(230),
            shipping_address: ShippingAddress { city: "Luxor".into(), details: "Karnak 4".into() },
        }
    }

    #[test]
    fn metadata_survives_the_gateway_string_map() {
        let original = metadata();
        let map = original.to_map().unwrap();
        assert!(map.values().all(|v| v.len() <= 500));
        assert_eq!(CheckoutMetadata::from_map(&map).unwrap(), original);
    }

    #[test]
    fn large_cart_is_spread_over_several_values() {
        let mut original = metadata();
        original.items = (1..=40)
            .map(|n| OrderItem { product: Uuid::now_v7(), quantity: n, price: dec!(1234.56) })
            .collect();
        let map = original.to_map().unwrap();
        assert!(map.len() <= METADATA_MAX_KEYS);
        assert!(map.values().all(|v| v.len() <= METADATA_MAX_VALUE_LEN));
        assert!(map.contains_key("items_1"));
        assert_eq!(CheckoutMetadata::from_map(&map).unwrap(), original);
    }

    #[test]
    fn cart_beyond_the_key_limit_is_refused() {
        let mut original = metadata();
        original.items = (0..1000).map(|_| OrderItem { product: Uuid::now_v7(), quantity: 1, price: dec!(1) }).collect();
        assert!(matches!(original.to_map(), Err(PaymentError::MetadataTooLarge(_))));
    }

    #[test]
    fn malformed_order_line_is_reported() {
        let mut map = metadata().to_map().unwrap();
        map.insert("items_0".into(), "not-a-line".into());
        let err = CheckoutMetadata::from_map(&map).unwrap_err();
        assert!(matches!(err, PaymentError::Metadata(_)), "{err}");
    }

    #[test]
    fn missing_metadata_field_is_reported() {
        let mut map = metadata().to_map().unwrap();
        map.remove("user_id");
        let err = CheckoutMetadata::from_map(&map).unwrap_err();
        assert!(err.to_string().contains("user_id"), "{err}");
    }

    #[test]
    fn paid_card_order_uses_token_as_idempotency_key() {
        let paid_at = Utc::now();
        let order = metadata().into_new_order(paid_at);
        assert_eq!(order.payment_method, PaymentMethod::Card);
        assert_eq!(order.paid_at, Some(paid_at));
        assert_eq!(order.idempotency_key.as_deref(), Some("tok_123"));
    }
}
