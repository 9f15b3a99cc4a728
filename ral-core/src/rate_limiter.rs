use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use ral_types::RateLimitConfig;

/// A sliding-window rate limiter: `max_requests` admitted per rolling
/// `window_ms`, enforced by pruning a timestamp queue rather than by
/// counting fixed buckets (spec §4.1). `acquire` never rejects; it sleeps
/// until a slot opens, so callers never have to retry.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests as usize,
            window: config.window(),
            timestamps: Mutex::new(VecDeque::with_capacity(config.max_requests as usize)),
        }
    }

    /// Block until a request slot is available, then reserve it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                prune(&mut timestamps, now, self.window);

                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return;
                }

                // Oldest timestamp determines when a slot frees up.
                let oldest = *timestamps.front().expect("len >= max_requests > 0 implies non-empty");
                (oldest + self.window).saturating_duration_since(now)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Non-blocking check used by callers that want to surface
    /// `RalError::RateLimited` instead of waiting (spec §4.1's "or raise
    /// `RateLimited`" branch).
    pub async fn try_acquire(&self) -> bool {
        let mut timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        prune(&mut timestamps, now, self.window);
        if timestamps.len() < self.max_requests {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Requests currently counted within the window, for diagnostics.
    pub async fn current_count(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        prune(&mut timestamps, now, self.window);
        timestamps.len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_max_requests_immediately() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window_ms: 1000,
        });
        for _ in 0..3 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn slot_frees_after_window_elapses() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_ms: 100,
        });
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
        tokio::time::advance(Duration::from_millis(101)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_blocks_until_window_frees_a_slot() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_ms: 100,
        });
        limiter.acquire().await;
        let start = Instant::now();
        let task = tokio::spawn(async move {
            limiter.acquire().await;
        });
        tokio::time::advance(Duration::from_millis(100)).await;
        task.await.unwrap();
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(100));
    }

    proptest::proptest! {
        #[test]
        fn never_admits_more_than_max_in_any_window(max in 1u32..20, requested in 1u32..50) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let limiter = RateLimiter::new(RateLimitConfig { max_requests: max, window_ms: 1000 });
                let mut admitted = 0u32;
                for _ in 0..requested {
                    if limiter.try_acquire().await {
                        admitted += 1;
                    }
                }
                assert!(admitted <= max);
            });
        }
    }
}
