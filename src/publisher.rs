//! Domain event publication over NATS.
//!
//! Publishing is fire-and-forget: a workflow that has already succeeded is
//! never failed by the event bus.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Publisher that drops every event.
    pub fn disabled() -> Self { Self::default() }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    pub async fn publish(&self, event: DomainEvent) {
        let Some(nats) = &self.nats else {
            tracing::debug!(subject = event.subject(), "Event bus disabled, event dropped");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot encode event");
                return;
            }
        };
        match nats.publish(event.subject().to_string(), payload.into()).await {
            Ok(()) => tracing::debug!(subject = event.subject(), "Event published"),
            Err(e) => tracing::warn!(subject = event.subject(), error = %e, "Event publish failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{SaleEvent, ProductEvent};
    use crate::domain::value_objects::Money;
    use uuid::Uuid;

    #[test]
    fn test_event_wire_shape() {
        let event = DomainEvent::Sale(SaleEvent::Completed { sale_id: Uuid::nil(), sale_number: "V-000007".into(), total: Money::cents(2900), units: 3 });
        assert_eq!(event.subject(), "pos.sales");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sale");
        assert_eq!(json["event"], "completed");
        assert_eq!(json["sale_number"], "V-000007");
        let imported = serde_json::to_value(DomainEvent::Product(ProductEvent::Imported { created: 2, updated: 1, failed: 0 })).unwrap();
        assert_eq!((imported["type"].as_str(), imported["created"].as_u64()), (Some("product"), Some(2)));
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_a_no_op() {
        let publisher = EventPublisher::disabled();
        assert!(!publisher.is_enabled());
        publisher.publish(DomainEvent::Product(ProductEvent::Deactivated { product_id: Uuid::nil() })).await;
    }
}
