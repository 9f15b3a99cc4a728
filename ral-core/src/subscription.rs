use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use ral_types::Commitment;

/// A locally-scoped, monotonically increasing handle allocator.
///
/// The websocket supervisor hands subscribers an opaque `u64` that stays
/// stable across reconnects even though the upstream subscription id behind
/// it is re-issued (spec §3's "external handle unchanged" rebind rule).
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Opaque, subscription-kind-specific filter descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    Account { address: String },
    Logs { filter: String },
    ProgramAccounts { program_id: String },
}

/// A live (or reconnecting) subscription tracked by the websocket
/// supervisor. `handle` is the externally-visible id; `upstream_id` is the
/// subscription id assigned by the current upstream connection and is
/// replaced wholesale on reconnect rebind.
pub struct Subscription {
    pub handle: u64,
    pub filter: SubscriptionFilter,
    pub commitment: Commitment,
    pub upstream_id: Option<u64>,
}

impl Subscription {
    #[must_use]
    pub const fn new(handle: u64, filter: SubscriptionFilter, commitment: Commitment) -> Self {
        Self {
            handle,
            filter,
            commitment,
            upstream_id: None,
        }
    }
}

/// A locally generated request awaiting a matching response or timeout,
/// tracked by the sidecar client and the websocket supervisor's RPC calls.
pub struct PendingRequest<T> {
    pub id: u64,
    pub method: String,
    pub deadline: Instant,
    pub resolve: tokio::sync::oneshot::Sender<T>,
}

impl<T> PendingRequest<T> {
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, deadline: Instant) -> (Self, tokio::sync::oneshot::Receiver<T>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        (
            Self {
                id,
                method: method.into(),
                deadline,
                resolve: tx,
            },
            rx,
        )
    }

    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_allocator_is_monotonic_and_unique() {
        let alloc = HandleAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert!(b > a);
    }
}
