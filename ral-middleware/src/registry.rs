use std::collections::HashMap;
use std::sync::Arc;

use ral_core::EndpointRecord;
use tokio::sync::RwLock;

/// Shared, concurrency-safe map of endpoint URL to its health record.
///
/// The connection pool owns one `EndpointRegistry` and consults it for
/// scoring; this crate layers the administrative operations spec §4.2 asks
/// for (force a single endpoint healthy, or reset every endpoint) on top of
/// it, mirroring the teacher's separation of a connector's own state from
/// the middleware that manipulates it from outside the request path.
#[derive(Clone)]
pub struct EndpointRegistry {
    inner: Arc<RwLock<HashMap<String, EndpointRecord>>>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, url: impl Into<String>) {
        let url = url.into();
        let mut map = self.inner.write().await;
        map.entry(url.clone()).or_insert_with(|| EndpointRecord::new(url));
    }

    pub async fn with_record<R>(&self, url: &str, f: impl FnOnce(&mut EndpointRecord) -> R) -> Option<R> {
        let mut map = self.inner.write().await;
        map.get_mut(url).map(f)
    }

    pub async fn snapshot(&self) -> Vec<EndpointRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Force a single endpoint back to healthy, clearing its error streak.
    /// Idempotent: calling it on an already-healthy endpoint, or an unknown
    /// URL, is a no-op.
    pub async fn force_healthy(&self, url: &str) {
        let mut map = self.inner.write().await;
        if let Some(record) = map.get_mut(url) {
            record.force_healthy();
            tracing::info!(url, "endpoint manually marked healthy");
        }
    }

    /// Force every registered endpoint back to healthy.
    pub async fn reset_all(&self) {
        let mut map = self.inner.write().await;
        for record in map.values_mut() {
            record.force_healthy();
        }
        tracing::info!(count = map.len(), "all endpoints manually reset to healthy");
    }
}
