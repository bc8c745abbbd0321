//! Stripe Checkout adapter.

use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), api_base: api_base.into(), secret_key: secret_key.into() }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Flattens the request into Stripe's bracketed form encoding.
fn form_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
        ("customer_email".to_owned(), request.customer_email.clone()),
        ("client_reference_id".to_owned(), request.client_reference_id.clone()),
    ];
    for (i, line) in request.line_items.iter().enumerate() {
        params.push((format!("line_items[{i}][quantity]"), line.quantity.to_string()));
        params.push((format!("line_items[{i}][price_data][currency]"), request.currency.clone()));
        params.push((format!("line_items[{i}][price_data][unit_amount]"), line.unit_amount.to_string()));
        params.push((format!("line_items[{i}][price_data][product_data][name]"), line.name.clone()));
    }
    for (key, value) in &request.metadata {
        params.push((format!("metadata[{key}]"), value.clone()));
    }
    params
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip_all, fields(client_reference_id = %request.client_reference_id))]
    async fn create_checkout_session(&self, request: CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base.trim_end_matches('/')))
            .bearer_auth(&self.secret_key)
            .form(&form_params(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorResponse = response.json().await.unwrap_or_default();
            return Err(PaymentError::Gateway { status: status.as_u16(), message: body.error.message });
        }

        let session: SessionResponse = response.json().await?;
        let url = session
            .url
            .ok_or_else(|| PaymentError::Gateway { status: status.as_u16(), message: "session has no redirect url".into() })?;
        tracing::debug!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSession { id: session.id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::SessionLineItem;
    use std::collections::BTreeMap;

    #[test]
    fn form_encoding_covers_lines_and_metadata() {
        let request = CheckoutSessionRequest {
            customer_email: "ana@example.com".into(),
            client_reference_id: "user-1".into(),
            currency: "usd".into(),
            line_items: vec![
                SessionLineItem { name: "Order items".into(), unit_amount: 18000, quantity: 1 },
                SessionLineItem { name: "Shipping".into(), unit_amount: 5000, quantity: 1 },
            ],
            success_url: "https://shop.test/ok".into(),
            cancel_url: "https://shop.test/cancel".into(),
            metadata: BTreeMap::from([("order_token".to_owned(), "tok".to_owned())]),
        };
        let params = form_params(&request);
        let get = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("18000"));
        assert_eq!(get("line_items[1][price_data][product_data][name]"), Some("Shipping"));
        assert_eq!(get("line_items[1][price_data][currency]"), Some("usd"));
        assert_eq!(get("metadata[order_token]"), Some("tok"));
    }
}
