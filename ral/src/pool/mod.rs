//! Connection pool: owns N RPC endpoints, selects the best one per call,
//! runs a background health checker, and retries failed operations against
//! the next-best endpoint.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ral_core::{RalError, RateLimiter, RpcTransport};
use ral_middleware::EndpointRegistry;
use ral_types::{EndpointConfig, PoolType};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Low-cost RPC used to probe endpoint health.
const HEALTH_CHECK_METHOD: &str = "getVersion";
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Orderable rank key for endpoint selection: higher score wins; among
/// equal scores, lower priority wins; among equal priority, higher weight
/// wins.
fn rank_key(score: i64, config: &EndpointConfig) -> (i64, i64, u32) {
    (score, -i64::from(config.priority), config.weight)
}

struct PoolEndpoint {
    config: EndpointConfig,
    transport: Arc<dyn RpcTransport>,
    rate_limiter: RateLimiter,
}

/// Builder enforcing the data-model invariants of an endpoint set:
/// non-empty, and unique URLs within each pool type (spec §3).
#[derive(Default)]
pub struct ConnectionPoolBuilder {
    endpoints: Vec<PoolEndpoint>,
    health_check_interval: Option<Duration>,
}

impl ConnectionPoolBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_endpoint(mut self, config: EndpointConfig, transport: Arc<dyn RpcTransport>) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit);
        self.endpoints.push(PoolEndpoint {
            config,
            transport,
            rate_limiter,
        });
        self
    }

    #[must_use]
    pub const fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    /// # Errors
    /// Returns `RalError::NoEndpointAvailable` if no endpoints were
    /// registered, or a classified error if the same URL is registered
    /// twice for an overlapping pool type.
    pub async fn build(self) -> Result<ConnectionPool, RalError> {
        if self.endpoints.is_empty() {
            return Err(RalError::NoEndpointAvailable { pool_type: "any" });
        }

        for pool_type in [PoolType::Query, PoolType::Submit, PoolType::Websocket] {
            let mut seen = HashSet::new();
            for endpoint in &self.endpoints {
                if endpoint.config.supports(pool_type) && !seen.insert(endpoint.config.url.as_str()) {
                    return Err(RalError::classify(
                        &endpoint.config.url,
                        format!("duplicate endpoint URL registered for pool type {pool_type}"),
                    ));
                }
            }
        }

        let registry = EndpointRegistry::new();
        for endpoint in &self.endpoints {
            registry.register(endpoint.config.url.clone()).await;
        }

        Ok(ConnectionPool {
            endpoints: self.endpoints,
            registry,
            health_check_interval: self.health_check_interval.unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL),
            health_handle: tokio::sync::Mutex::new(None),
        })
    }
}

/// Owns endpoint records partitioned implicitly by pool type (each
/// `EndpointConfig` carries its own supported set), selects the best
/// endpoint per call, and executes operations with failover retry.
pub struct ConnectionPool {
    endpoints: Vec<PoolEndpoint>,
    registry: EndpointRegistry,
    health_check_interval: Duration,
    health_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    #[must_use]
    pub fn builder() -> ConnectionPoolBuilder {
        ConnectionPoolBuilder::new()
    }

    #[must_use]
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Select the best endpoint for `pool_type`: highest health score among
    /// healthy endpoints, ties broken by lower `priority` then higher
    /// `weight` (spec §4.2). If no healthy candidate exists, falls back to
    /// the least-unhealthy endpoint supporting `pool_type` (fewest
    /// consecutive errors) and logs — this never fails as long as at least
    /// one endpoint is registered for `pool_type`.
    ///
    /// # Errors
    /// `RalError::NoEndpointAvailable` if no registered endpoint supports
    /// `pool_type` at all.
    pub async fn get_best_connection(&self, pool_type: PoolType) -> Result<usize, RalError> {
        // Rank key: higher score wins; ties broken by lower priority, then
        // higher weight (spec §4.2).
        let mut best: Option<(usize, i64)> = None;
        let mut least_unhealthy: Option<(usize, u32)> = None;
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if !endpoint.config.supports(pool_type) {
                continue;
            }
            let (healthy, score, consecutive_errors) = self
                .registry
                .with_record(&endpoint.config.url, |record| {
                    (record.is_healthy(), record.score(), record.consecutive_errors())
                })
                .await
                .unwrap_or((false, i64::MIN, u32::MAX));

            if healthy {
                let is_better = match best {
                    None => true,
                    Some((best_index, best_score)) => {
                        rank_key(score, &endpoint.config) > rank_key(best_score, &self.endpoints[best_index].config)
                    }
                };
                if is_better {
                    best = Some((index, score));
                }
            } else {
                let is_less_unhealthy = match least_unhealthy {
                    None => true,
                    Some((_, best_errors)) => consecutive_errors < best_errors,
                };
                if is_less_unhealthy {
                    least_unhealthy = Some((index, consecutive_errors));
                }
            }
        }

        if let Some((index, _)) = best {
            return Ok(index);
        }

        if let Some((index, consecutive_errors)) = least_unhealthy {
            tracing::warn!(
                url = %self.endpoints[index].config.url,
                consecutive_errors,
                "no healthy endpoint for pool type, falling back to least-unhealthy"
            );
            return Ok(index);
        }

        Err(RalError::NoEndpointAvailable { pool_type: pool_type.as_str() })
    }

    fn endpoint(&self, index: usize) -> &PoolEndpoint {
        &self.endpoints[index]
    }

    /// Execute `operation` against the best available endpoint for
    /// `pool_type`, retrying against progressively lower-ranked endpoints on
    /// failure up to `max_retries` additional attempts, with a
    /// `100ms * attempt` backoff between attempts (spec §4.2 step 3).
    /// Errors classified as do-not-retry (invalid params, not found) are
    /// surfaced immediately without consuming a retry.
    ///
    /// # Errors
    /// The classified error from the last attempt if it was do-not-retry;
    /// otherwise `RalError::AllAttemptsFailed` once retries are exhausted.
    pub async fn execute_with_retry<T, F, Fut>(&self, pool_type: PoolType, operation: F) -> Result<T, RalError>
    where
        F: Fn(Arc<dyn RpcTransport>) -> Fut,
        Fut: std::future::Future<Output = Result<T, RalError>>,
    {
        self.execute_with_retry_n(pool_type, DEFAULT_MAX_RETRIES, operation).await
    }

    /// As `execute_with_retry`, with an explicit retry budget.
    pub async fn execute_with_retry_n<T, F, Fut>(
        &self,
        pool_type: PoolType,
        max_retries: u32,
        operation: F,
    ) -> Result<T, RalError>
    where
        F: Fn(Arc<dyn RpcTransport>) -> Fut,
        Fut: std::future::Future<Output = Result<T, RalError>>,
    {
        let mut attempted_urls = Vec::new();
        let mut last_cause = String::new();

        for attempt in 0..=max_retries {
            let index = self.get_best_connection(pool_type).await?;
            let endpoint = self.endpoint(index);
            let url = endpoint.config.url.clone();

            endpoint.rate_limiter.acquire().await;
            self.registry.with_record(&url, |record| record.begin_request()).await;

            let started = Instant::now();
            let result = operation(Arc::clone(&endpoint.transport)).await;
            let elapsed = started.elapsed();

            match result {
                Ok(value) => {
                    self.registry
                        .with_record(&url, |record| record.record_success(elapsed.as_millis() as u64))
                        .await;
                    return Ok(value);
                }
                Err(err) => {
                    self.registry
                        .with_record(&url, |record| record.record_error(err.to_string()))
                        .await;

                    if err.is_do_not_retry() {
                        return Err(err);
                    }

                    attempted_urls.push(url);
                    last_cause = err.to_string();

                    if attempt < max_retries {
                        tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt + 1))).await;
                    }
                }
            }
        }

        Err(RalError::AllAttemptsFailed {
            attempts: max_retries + 1,
            urls: attempted_urls,
            last_cause,
        })
    }

    /// Start the background health checker, polling every endpoint on
    /// `health_check_interval` with a low-cost RPC. Idempotent: calling it
    /// twice has no effect after the first.
    pub async fn start_health_checker(self: &Arc<Self>) {
        let mut guard = self.health_handle.lock().await;
        if guard.is_some() {
            return;
        }

        let pool = Arc::clone(self);
        let interval = pool.health_check_interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for endpoint in &pool.endpoints {
                    let healthy = timeout(HEALTH_CHECK_TIMEOUT, endpoint.transport.call(HEALTH_CHECK_METHOD, json!([])))
                        .await
                        .map(|r| r.is_ok())
                        .unwrap_or(false);
                    pool.registry
                        .with_record(&endpoint.config.url, |record| record.record_health_check(healthy))
                        .await;
                    if !healthy {
                        tracing::warn!(url = %endpoint.config.url, "endpoint health check failed");
                    }
                }
            }
        }));
    }

    pub async fn close(&self) {
        if let Some(handle) = self.health_handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ral_mock::MockTransport;
    use serde_json::json;

    fn endpoint(url: &str, priority: u32) -> EndpointConfig {
        EndpointConfig::new(url, priority, [PoolType::Query])
            .with_rate_limit(ral_types::RateLimitConfig::new(1000, 1000))
    }

    #[tokio::test]
    async fn selects_lower_priority_when_scores_tie() {
        let pool = ConnectionPool::builder()
            .with_endpoint(endpoint("mock://low", 5), Arc::new(MockTransport::new("mock://low")))
            .with_endpoint(endpoint("mock://high", 1), Arc::new(MockTransport::new("mock://high")))
            .build()
            .await
            .unwrap();

        let index = pool.get_best_connection(PoolType::Query).await.unwrap();
        assert_eq!(pool.endpoint(index).config.url, "mock://high");
    }

    #[tokio::test]
    async fn failover_skips_unhealthy_endpoint_and_succeeds_on_next() {
        let bad = Arc::new(
            MockTransport::new("mock://bad")
                .with_error(RalError::classify("mock://bad", "connection refused"))
                .with_error(RalError::classify("mock://bad", "connection refused"))
                .with_error(RalError::classify("mock://bad", "connection refused")),
        );
        let good = Arc::new(MockTransport::new("mock://good").with_response(json!({"ok": true})));

        let pool = ConnectionPool::builder()
            .with_endpoint(endpoint("mock://bad", 1), bad.clone())
            .with_endpoint(endpoint("mock://good", 2), good)
            .build()
            .await
            .unwrap();

        // Drive the bad endpoint unhealthy directly: scoring would otherwise
        // make `get_best_connection` hop to `good` after the first failure,
        // consuming its single scripted response before the real call below.
        for _ in 0..3 {
            pool.registry()
                .with_record("mock://bad", |record| record.record_error("connection refused".to_string()))
                .await;
        }

        let result = pool
            .execute_with_retry(PoolType::Query, |transport| {
                let transport = Arc::clone(&transport);
                async move { transport.call("x", json!([])).await }
            })
            .await;
        assert_eq!(result.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn do_not_retry_error_short_circuits_without_exhausting_retries() {
        let transport = Arc::new(
            MockTransport::new("mock://strict").with_error(RalError::classify("mock://strict", "Invalid params: bad pubkey")),
        );
        let pool = ConnectionPool::builder()
            .with_endpoint(endpoint("mock://strict", 1), transport.clone())
            .build()
            .await
            .unwrap();

        let result = pool
            .execute_with_retry(PoolType::Query, |transport| {
                let transport = Arc::clone(&transport);
                async move { transport.call("x", json!([])).await }
            })
            .await;
        assert!(result.unwrap_err().is_do_not_retry());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn build_rejects_empty_endpoint_set() {
        let result = ConnectionPool::builder().build().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn falls_back_to_least_unhealthy_when_every_endpoint_is_unhealthy() {
        let pool = ConnectionPool::builder()
            .with_endpoint(endpoint("mock://worse", 1), Arc::new(MockTransport::new("mock://worse")))
            .with_endpoint(endpoint("mock://better", 1), Arc::new(MockTransport::new("mock://better")))
            .build()
            .await
            .unwrap();

        for _ in 0..5 {
            pool.registry()
                .with_record("mock://worse", |record| record.record_error("connection refused".to_string()))
                .await;
        }
        for _ in 0..3 {
            pool.registry()
                .with_record("mock://better", |record| record.record_error("connection refused".to_string()))
                .await;
        }

        let index = pool.get_best_connection(PoolType::Query).await.unwrap();
        assert_eq!(pool.endpoint(index).config.url, "mock://better");
    }

    #[tokio::test]
    async fn no_endpoint_available_only_when_none_support_the_pool_type() {
        let pool = ConnectionPool::builder()
            .with_endpoint(
                EndpointConfig::new("mock://submit-only", 1, [PoolType::Submit]),
                Arc::new(MockTransport::new("mock://submit-only")),
            )
            .build()
            .await
            .unwrap();

        let result = pool.get_best_connection(PoolType::Query).await;
        assert!(matches!(result, Err(RalError::NoEndpointAvailable { .. })));
    }
}
