//! Publishes domain events to NATS when a broker is configured.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

impl EventPublisher {
    /// Publisher that drops every event.
    pub fn disabled() -> Self { Self::default() }

    pub fn new(client: async_nats::Client) -> Self { Self { client: Some(client) } }

    /// Connects to `url`; an unreachable broker leaves publishing disabled.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(%url, "Connected to NATS");
                Self::new(client)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "NATS unavailable, domain events will not be published");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool { self.client.is_some() }

    /// Fire-and-forget: failures are logged, never returned to the caller.
    pub async fn publish(&self, event: &DomainEvent) {
        let Some(client) = &self.client else { return };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode domain event");
                return;
            }
        };
        let subject = event.subject();
        match client.publish(subject.to_string(), payload.into()).await {
            Ok(()) => tracing::debug!(subject, "Published domain event"),
            Err(e) => tracing::warn!(subject, error = %e, "Failed to publish domain event"),
        }
    }
}
