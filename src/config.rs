//! Service configuration, read from the environment.

use rust_decimal::Decimal;
use std::env;
use validator::Validate;

use crate::payments::stripe::DEFAULT_API_BASE;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_SHIPPING_COST: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Clone, Debug, Validate)]
pub struct Config {
    #[validate(range(min = 1))]
    pub port: u16,
    /// Postgres URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    #[validate(length(min = 32, message = "JWT_SECRET must be at least 32 bytes"))]
    pub jwt_secret: String,
    pub stripe_secret_key: String,
    #[validate(length(min = 1, message = "STRIPE_WEBHOOK_SECRET must be set"))]
    pub stripe_webhook_secret: String,
    #[validate(url)]
    pub stripe_api_base: String,
    #[validate(range(min = 1))]
    pub webhook_tolerance_secs: i64,
    pub shipping_cost: Decimal,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(url)]
    pub checkout_success_url: String,
    #[validate(url)]
    pub checkout_cancel_url: String,
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid { name, reason: e.to_string() }),
        None => Ok(default),
    }
}

impl Config {
    /// Reads the configuration from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            port: parsed("PORT", DEFAULT_PORT)?,
            database_url: optional("DATABASE_URL"),
            nats_url: optional("NATS_URL"),
            jwt_secret: required("JWT_SECRET")?,
            stripe_secret_key: optional("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: optional("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned()),
            webhook_tolerance_secs: parsed("WEBHOOK_TOLERANCE_SECS", DEFAULT_WEBHOOK_TOLERANCE_SECS)?,
            shipping_cost: parsed("SHIPPING_COST", DEFAULT_SHIPPING_COST)?,
            currency: optional("CURRENCY").unwrap_or_else(|| "usd".to_owned()).to_lowercase(),
            checkout_success_url: optional("CHECKOUT_SUCCESS_URL").unwrap_or_else(|| "http://localhost:8083/orders".to_owned()),
            checkout_cancel_url: optional("CHECKOUT_CANCEL_URL").unwrap_or_else(|| "http://localhost:8083/cart".to_owned()),
        };
        config.validate()?;
        if config.shipping_cost < Decimal::ZERO {
            return Err(ConfigError::Invalid { name: "SHIPPING_COST", reason: "must not be negative".into() });
        }
        Ok(config)
    }

    /// A configuration for tests and local tooling.
    pub fn for_tests() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            nats_url: None,
            jwt_secret: "test-secret-that-is-long-enough-for-hs256".to_owned(),
            stripe_secret_key: "sk_test_xxx".to_owned(),
            stripe_webhook_secret: "whsec_test".to_owned(),
            stripe_api_base: DEFAULT_API_BASE.to_owned(),
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            shipping_cost: DEFAULT_SHIPPING_COST,
            currency: "usd".to_owned(),
            checkout_success_url: "https://shop.test/orders".to_owned(),
            checkout_cancel_url: "https://shop.test/cart".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        let config = Config::for_tests();
        assert!(config.validate().is_ok());
        assert_eq!(config.shipping_cost, Decimal::from(50));
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let config = Config { jwt_secret: "short".into(), ..Config::for_tests() };
        assert!(config.validate().is_err());
    }
}
