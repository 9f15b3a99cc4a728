use std::time::{SystemTime, UNIX_EPOCH};

/// Consecutive-error count at which a healthy endpoint is marked unhealthy.
pub const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;
/// Consecutive-success count at which an unhealthy endpoint recovers.
pub const DEFAULT_HEALTHY_THRESHOLD: u32 = 2;
/// Smoothing factor for the exponential moving average of observed latency.
const LATENCY_EMA_ALPHA: f64 = 0.1;

/// Per-endpoint health bookkeeping: request counters, latency EMA, and the
/// consecutive success/error streaks that drive the healthy/unhealthy state
/// transition used by the connection pool's scoring and health checker.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub url: String,
    consecutive_successes: u32,
    consecutive_errors: u32,
    total_requests: u64,
    failed_requests: u64,
    ema_latency_ms: f64,
    active_requests: u32,
    last_error: Option<String>,
    last_error_at_ms: Option<u64>,
    last_health_check_ms: Option<u64>,
    healthy: bool,
    unhealthy_threshold: u32,
    healthy_threshold: u32,
}

impl EndpointRecord {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            consecutive_successes: 0,
            consecutive_errors: 0,
            total_requests: 0,
            failed_requests: 0,
            ema_latency_ms: 0.0,
            active_requests: 0,
            last_error: None,
            last_error_at_ms: None,
            last_health_check_ms: None,
            healthy: true,
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
            healthy_threshold: DEFAULT_HEALTHY_THRESHOLD,
        }
    }

    #[must_use]
    pub const fn with_thresholds(mut self, unhealthy: u32, healthy: u32) -> Self {
        self.unhealthy_threshold = unhealthy;
        self.healthy_threshold = healthy;
        self
    }

    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.healthy
    }

    #[must_use]
    pub const fn active_requests(&self) -> u32 {
        self.active_requests
    }

    #[must_use]
    pub const fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    #[must_use]
    pub const fn total_requests(&self) -> u64 {
        self.total_requests
    }

    #[must_use]
    pub const fn ema_latency_ms(&self) -> f64 {
        self.ema_latency_ms
    }

    /// Call before dispatching a request on this endpoint.
    pub fn begin_request(&mut self) {
        self.active_requests += 1;
    }

    /// Record a successful response, resetting the error streak and rolling
    /// the latency EMA forward.
    pub fn record_success(&mut self, latency_ms: u64) {
        self.active_requests = self.active_requests.saturating_sub(1);
        self.total_requests += 1;
        self.consecutive_successes += 1;
        self.consecutive_errors = 0;

        self.ema_latency_ms = if self.total_requests == 1 {
            latency_ms as f64
        } else {
            LATENCY_EMA_ALPHA * latency_ms as f64 + (1.0 - LATENCY_EMA_ALPHA) * self.ema_latency_ms
        };

        if !self.healthy && self.consecutive_successes >= self.healthy_threshold {
            self.healthy = true;
        }
    }

    /// Record a failed response, resetting the success streak.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.active_requests = self.active_requests.saturating_sub(1);
        self.total_requests += 1;
        self.failed_requests += 1;
        self.consecutive_errors += 1;
        self.consecutive_successes = 0;
        self.last_error = Some(message.into());
        self.last_error_at_ms = Some(now_ms());

        if self.healthy && self.consecutive_errors >= self.unhealthy_threshold {
            self.healthy = false;
        }
    }

    /// Force a healthy state regardless of streaks (manual recovery, spec
    /// §4.2's administrative override).
    pub fn force_healthy(&mut self) {
        self.healthy = true;
        self.consecutive_errors = 0;
    }

    pub fn record_health_check(&mut self, healthy: bool) {
        self.last_health_check_ms = Some(now_ms());
        if healthy {
            self.force_healthy();
        } else {
            self.consecutive_errors = self.consecutive_errors.max(self.unhealthy_threshold);
            self.healthy = false;
        }
    }

    /// Score used by `ConnectionPool::get_best_connection` to rank
    /// candidate endpoints: higher is better.
    #[must_use]
    pub fn score(&self) -> i64 {
        let mut score = 10 * i64::from(self.consecutive_successes) - 20 * i64::from(self.consecutive_errors);
        score += (1000.0 - self.ema_latency_ms).max(0.0) as i64;
        score -= 50 * i64::from(self.active_requests);
        if self.total_requests > 100 {
            score += 20;
        }
        score
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_unhealthy_after_threshold_errors() {
        let mut rec = EndpointRecord::new("https://rpc");
        assert!(rec.is_healthy());
        rec.record_error("boom");
        rec.record_error("boom");
        assert!(rec.is_healthy());
        rec.record_error("boom");
        assert!(!rec.is_healthy());
    }

    #[test]
    fn recovers_after_healthy_threshold_successes() {
        let mut rec = EndpointRecord::new("https://rpc");
        for _ in 0..3 {
            rec.record_error("boom");
        }
        assert!(!rec.is_healthy());
        rec.record_success(10);
        assert!(!rec.is_healthy());
        rec.record_success(10);
        assert!(rec.is_healthy());
    }

    #[test]
    fn success_resets_error_streak() {
        let mut rec = EndpointRecord::new("https://rpc");
        rec.record_error("boom");
        rec.record_error("boom");
        rec.record_success(5);
        assert_eq!(rec.consecutive_errors(), 0);
        rec.record_error("boom");
        rec.record_error("boom");
        assert!(rec.is_healthy());
    }

    #[test]
    fn score_penalizes_active_requests_and_rewards_low_latency() {
        let mut fast = EndpointRecord::new("https://fast");
        fast.record_success(10);
        let mut busy = EndpointRecord::new("https://busy");
        busy.record_success(10);
        busy.begin_request();
        busy.begin_request();
        assert!(fast.score() > busy.score());
    }
}
