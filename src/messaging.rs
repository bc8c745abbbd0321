//! Outbound domain events.

use async_trait::async_trait;
use mockall::automock;

use crate::domain::events::OrderEvent;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish to {subject}: {message}")]
    Broker { subject: &'static str, message: String },
}

#[automock]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderEvent) -> Result<(), PublishError>;
}

/// Publishes events as JSON on NATS.
#[derive(Debug, Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<(), PublishError> {
        let subject = event.subject();
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| PublishError::Broker { subject, message: e.to_string() })
    }
}

/// Used when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<(), PublishError> {
        tracing::trace!(subject = event.subject(), "no broker configured, dropping event");
        Ok(())
    }
}
