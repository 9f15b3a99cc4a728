//! Subscription demultiplexing: many sidecar clients can subscribe to the
//! same channel while the supervisor holds exactly one upstream
//! subscription for it, torn down only when the last client leaves (spec
//! §4.4, property P7).

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use ral_core::{RalError, SubscriptionFilter};
use ral_types::Commitment;
use tokio::sync::Mutex;

/// Role trait over the websocket supervisor so the mux can be unit tested
/// without a live socket.
#[async_trait]
pub trait UpstreamSubscriber: Send + Sync {
    async fn subscribe(&self, filter: SubscriptionFilter, commitment: Commitment) -> Result<u64, RalError>;
    async fn unsubscribe(&self, handle: u64) -> Result<(), RalError>;
}

#[async_trait]
impl UpstreamSubscriber for crate::streaming::SupervisorHandle {
    async fn subscribe(&self, filter: SubscriptionFilter, commitment: Commitment) -> Result<u64, RalError> {
        Self::subscribe(self, filter, commitment).await
    }

    async fn unsubscribe(&self, handle: u64) -> Result<(), RalError> {
        Self::unsubscribe(self, handle).await
    }
}

struct ChannelState {
    upstream_handle: u64,
    clients: HashSet<u64>,
}

/// Tracks, per channel name, which clients are subscribed and the single
/// upstream handle backing them.
#[derive(Default)]
pub struct SubscriptionMux {
    channels: Mutex<HashMap<String, ChannelState>>,
}

impl SubscriptionMux {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `client_id` to `channel_name(filter)`. Opens a new upstream
    /// subscription only if this is the channel's first subscriber.
    ///
    /// # Errors
    /// Propagates the upstream's subscribe failure when a new upstream
    /// subscription is required.
    pub async fn subscribe(
        &self,
        upstream: &dyn UpstreamSubscriber,
        client_id: u64,
        filter: SubscriptionFilter,
        commitment: Commitment,
    ) -> Result<String, RalError> {
        let channel = crate::streaming::channel_name(&filter);
        let mut channels = self.channels.lock().await;
        match channels.get_mut(&channel) {
            Some(state) => {
                state.clients.insert(client_id);
            }
            None => {
                let upstream_handle = upstream.subscribe(filter, commitment).await?;
                channels.insert(
                    channel.clone(),
                    ChannelState {
                        upstream_handle,
                        clients: HashSet::from([client_id]),
                    },
                );
            }
        }
        Ok(channel)
    }

    /// Remove `client_id` from `channel`. Tears down the upstream
    /// subscription only when it was the last remaining client.
    pub async fn unsubscribe(&self, upstream: &dyn UpstreamSubscriber, client_id: u64, channel: &str) {
        let upstream_handle = {
            let mut channels = self.channels.lock().await;
            let Some(state) = channels.get_mut(channel) else {
                return;
            };
            state.clients.remove(&client_id);
            if state.clients.is_empty() {
                channels.remove(channel).map(|s| s.upstream_handle)
            } else {
                None
            }
        };
        if let Some(handle) = upstream_handle {
            let _ = upstream.unsubscribe(handle).await;
        }
    }

    /// Drop `client_id` from every channel it was part of (connection
    /// close), tearing down any upstream subscription left with no clients.
    pub async fn remove_client(&self, upstream: &dyn UpstreamSubscriber, client_id: u64) {
        let orphaned: Vec<u64> = {
            let mut channels = self.channels.lock().await;
            let mut orphaned = Vec::new();
            channels.retain(|_, state| {
                state.clients.remove(&client_id);
                if state.clients.is_empty() {
                    orphaned.push(state.upstream_handle);
                    false
                } else {
                    true
                }
            });
            orphaned
        };
        for handle in orphaned {
            let _ = upstream.unsubscribe(handle).await;
        }
    }

    #[must_use]
    pub async fn client_count(&self, channel: &str) -> usize {
        self.channels.lock().await.get(channel).map_or(0, |s| s.clients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingUpstream {
        next_handle: AtomicU64,
        subscribe_calls: AtomicU64,
        unsubscribe_calls: StdMutex<Vec<u64>>,
    }

    #[async_trait]
    impl UpstreamSubscriber for CountingUpstream {
        async fn subscribe(&self, _filter: SubscriptionFilter, _commitment: Commitment) -> Result<u64, RalError> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn unsubscribe(&self, handle: u64) -> Result<(), RalError> {
            self.unsubscribe_calls.lock().unwrap().push(handle);
            Ok(())
        }
    }

    fn account_filter() -> SubscriptionFilter {
        SubscriptionFilter::Account { address: "abc".to_string() }
    }

    #[tokio::test]
    async fn second_subscriber_reuses_the_single_upstream_subscription() {
        let upstream = CountingUpstream::default();
        let mux = SubscriptionMux::new();

        mux.subscribe(&upstream, 1, account_filter(), Commitment::Confirmed).await.unwrap();
        mux.subscribe(&upstream, 2, account_filter(), Commitment::Confirmed).await.unwrap();

        assert_eq!(upstream.subscribe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mux.client_count("account:abc").await, 2);
    }

    #[tokio::test]
    async fn upstream_torn_down_only_after_last_client_unsubscribes() {
        let upstream = CountingUpstream::default();
        let mux = SubscriptionMux::new();

        mux.subscribe(&upstream, 1, account_filter(), Commitment::Confirmed).await.unwrap();
        mux.subscribe(&upstream, 2, account_filter(), Commitment::Confirmed).await.unwrap();

        mux.unsubscribe(&upstream, 1, "account:abc").await;
        assert!(upstream.unsubscribe_calls.lock().unwrap().is_empty());

        mux.unsubscribe(&upstream, 2, "account:abc").await;
        assert_eq!(upstream.unsubscribe_calls.lock().unwrap().len(), 1);
        assert_eq!(mux.client_count("account:abc").await, 0);
    }

    #[tokio::test]
    async fn remove_client_tears_down_only_its_own_orphaned_channels() {
        let upstream = CountingUpstream::default();
        let mux = SubscriptionMux::new();

        mux.subscribe(&upstream, 1, account_filter(), Commitment::Confirmed).await.unwrap();
        mux.subscribe(&upstream, 2, account_filter(), Commitment::Confirmed).await.unwrap();

        mux.remove_client(&upstream, 1).await;
        assert!(upstream.unsubscribe_calls.lock().unwrap().is_empty());

        mux.remove_client(&upstream, 2).await;
        assert_eq!(upstream.unsubscribe_calls.lock().unwrap().len(), 1);
    }
}
