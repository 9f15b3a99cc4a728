use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Envelope wrapping every event published to the bus (spec §4.6): a stable
/// type name, an ISO-8601 timestamp, a locally-unique id, and the payload.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub id: u64,
    pub data: Value,
}

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

impl EventEnvelope {
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            data,
        }
    }
}

/// Thin wrapper over an external event bus. `publish` serializes the
/// envelope and hands it to whatever transport backs the bus; publish
/// failures are logged and swallowed by callers, never propagated (spec
/// §4.6 — "must not block the producing operation").
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, envelope: EventEnvelope) -> Result<(), crate::RalError>;
}

/// Publish and swallow any failure, logging it at `warn`. Producing
/// operations (DEX aggregation, the supervisor) call this instead of
/// `EventBus::publish` directly so the "never block on event emission"
/// invariant can't be forgotten at a call site.
pub async fn publish_best_effort(bus: &dyn EventBus, channel: &str, kind: &str, data: Value) {
    let envelope = EventEnvelope::new(kind, data);
    if let Err(err) = bus.publish(channel, envelope).await {
        tracing::warn!(channel, error = %err, "event publish failed");
    }
}
