//! Coupon Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Percentage;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount: Percentage,
    pub expiration_date: DateTime<Utc>,
    pub max_usage: i32,
    pub usage_count: i32,
}

impl Coupon {
    pub fn new(code: impl Into<String>, discount: Percentage, expiration_date: DateTime<Utc>, max_usage: i32) -> Self {
        Self { id: Uuid::now_v7(), code: code.into(), discount, expiration_date, max_usage, usage_count: 0 }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.expiration_date <= now }

    pub fn is_exhausted(&self) -> bool { self.usage_count >= self.max_usage }

    /// Whether the coupon may be attached to a cart right now.
    pub fn is_applicable(&self, now: DateTime<Utc>) -> bool { !self.is_expired(now) && !self.is_exhausted() }

    pub fn summary(&self) -> CouponSummary {
        CouponSummary { id: self.id, code: self.code.clone(), discount: self.discount, expiration_date: self.expiration_date }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    pub id: Uuid,
    pub code: String,
    pub discount: Percentage,
    pub expiration_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(expires_in: Duration, max_usage: i32) -> Coupon {
        Coupon::new("SAVE10", Percentage::new(dec!(10)).unwrap(), Utc::now() + expires_in, max_usage)
    }

    #[test]
    fn applicable_until_expiry() {
        let now = Utc::now();
        let c = coupon(Duration::days(1), 5);
        assert!(c.is_applicable(now));
        assert!(!c.is_applicable(now + Duration::days(2)));
    }

    #[test]
    fn exhausted_when_usage_reaches_cap() {
        let mut c = coupon(Duration::days(1), 1);
        c.usage_count = 1;
        assert!(c.is_exhausted());
        assert!(!c.is_applicable(Utc::now()));
    }
}
