//! Configuration types shared across the pool, supervisor, and sidecar.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PoolType;

/// Sliding-window rate-limit budget for a single endpoint.
///
/// Mirrors the shape of a token-bucket-like quota but is enforced as a true
/// sliding window (see `ral_core::RateLimiter`): at most `max_requests`
/// timestamps may fall within any `window` of wall-clock time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed within `window`.
    pub max_requests: u32,
    /// Width of the sliding window, in milliseconds.
    pub window_ms: u64,
}

impl RateLimitConfig {
    #[must_use]
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    #[must_use]
    pub const fn window(self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    /// Unknown-provider default: 10 requests/second (spec §4.1).
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 1_000,
        }
    }
}

/// Exponential backoff configuration for websocket reconnects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Minimum backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform jitter added to each delay, in ms.
    pub jitter_ms: u64,
    /// Terminal attempt count; after this many failed reconnects the
    /// supervisor transitions to `Failed`.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ms: 1_000,
            max_attempts: 10,
        }
    }
}

/// Immutable configuration for a single endpoint, fixed for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint URL. Unique within a given pool-type.
    pub url: String,
    /// Lower value = preferred. Used as a score tie-break.
    pub priority: u32,
    /// Purposes this endpoint may be used for.
    pub pool_types: HashSet<PoolType>,
    /// Rate-limit budget for this endpoint.
    pub rate_limit: RateLimitConfig,
    /// Tie-break weight; higher wins when score and priority are equal.
    pub weight: u32,
}

impl EndpointConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, priority: u32, pool_types: impl IntoIterator<Item = PoolType>) -> Self {
        Self {
            url: url.into(),
            priority,
            pool_types: pool_types.into_iter().collect(),
            rate_limit: RateLimitConfig::default(),
            weight: 0,
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub const fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn supports(&self, pool_type: PoolType) -> bool {
        self.pool_types.contains(&pool_type)
    }
}
