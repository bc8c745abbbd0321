//! Product Aggregate
//!
//! Only the catalog fields the order workflow reads: pricing and the
//! inventory ledger (`quantity` available, `sold` counter).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub price_after_discount: Option<Decimal>,
    pub quantity: i32,
    pub sold: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(title: impl Into<String>, price: Decimal, quantity: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            description: String::new(),
            price,
            price_after_discount: None,
            quantity,
            sold: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_discounted_price(mut self, price_after_discount: Decimal) -> Self {
        self.price_after_discount = Some(price_after_discount);
        self
    }

    /// Unit price charged at checkout: the discounted price when it is set and
    /// actually lower than the list price, the list price otherwise.
    pub fn effective_price(&self) -> Decimal {
        match self.price_after_discount {
            Some(discounted) if discounted > Decimal::ZERO && discounted < self.price => discounted,
            _ => self.price,
        }
    }

    pub fn has_stock_for(&self, quantity: i32) -> bool { self.quantity >= quantity }

    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            price: self.price,
            price_after_discount: self.price_after_discount,
        }
    }
}

/// The product fields embedded in cart and order responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub price_after_discount: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn effective_price_prefers_lower_discounted_price() {
        let p = Product::new("Lamp", dec!(100), 3).with_discounted_price(dec!(80));
        assert_eq!(p.effective_price(), dec!(80));
    }

    #[test]
    fn effective_price_ignores_discount_not_below_list_price() {
        let p = Product::new("Lamp", dec!(100), 3).with_discounted_price(dec!(120));
        assert_eq!(p.effective_price(), dec!(100));
        assert_eq!(Product::new("Desk", dec!(40), 1).effective_price(), dec!(40));
    }

    #[test]
    fn stock_check() {
        let p = Product::new("Chair", dec!(10), 2);
        assert!(p.has_stock_for(2));
        assert!(!p.has_stock_for(3));
    }
}
