use async_trait::async_trait;
use ral_core::{EventBus, EventEnvelope, RalError};
use tokio::sync::broadcast;

/// In-process `EventBus` backed by a broadcast channel, for use when no
/// external bus is wired up (local development, tests, the default facade
/// configuration). A real deployment swaps this for an adapter over the
/// external bus named in spec §4.6; that collaborator is out of scope here.
pub struct InProcessEventBus {
    sender: broadcast::Sender<(String, EventEnvelope)>,
}

impl InProcessEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(String, EventEnvelope)> {
        self.sender.subscribe()
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    async fn publish(&self, channel: &str, envelope: EventEnvelope) -> Result<(), RalError> {
        // No subscribers is not an error: publish is fire-and-forget.
        let _ = self.sender.send((channel.to_string(), envelope));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn published_events_are_observed_by_subscribers() {
        let bus = InProcessEventBus::default();
        let mut rx = bus.subscribe();

        ral_core::publish_best_effort(&bus, "dex", "DEX_QUOTE_COMPARISON", json!({"ok": true})).await;

        let (channel, envelope) = rx.recv().await.unwrap();
        assert_eq!(channel, "dex");
        assert_eq!(envelope.kind, "DEX_QUOTE_COMPARISON");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let bus = InProcessEventBus::default();
        bus.publish("dex", EventEnvelope::new("x", json!(null))).await.unwrap();
    }
}
