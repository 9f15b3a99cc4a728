use rand::Rng;
use ral_types::ReconnectConfig;

/// `delay(n) = min(base * 2^(n-1), max) + uniform(0, jitter)` (spec §4.3),
/// so the first reconnect attempt (`n=1`) waits `base_delay_ms`.
#[must_use]
pub fn delay_for_attempt(config: &ReconnectConfig, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(32);
    let exponential = config.base_delay_ms.saturating_mul(1u64 << exponent);
    let bounded = exponential.min(config.max_delay_ms);
    if config.jitter_ms == 0 {
        bounded
    } else {
        bounded + rand::rng().random_range(0..config.jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_capped_at_max_delay() {
        let config = ReconnectConfig {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter_ms: 0,
            max_attempts: 20,
        };
        assert_eq!(delay_for_attempt(&config, 10), 5000);
    }

    #[test]
    fn delay_grows_exponentially_before_cap() {
        let config = ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 100_000,
            jitter_ms: 0,
            max_attempts: 20,
        };
        assert_eq!(delay_for_attempt(&config, 1), 100);
        assert_eq!(delay_for_attempt(&config, 2), 200);
        assert_eq!(delay_for_attempt(&config, 3), 400);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let config = ReconnectConfig {
            base_delay_ms: 1000,
            max_delay_ms: 1000,
            jitter_ms: 50,
            max_attempts: 20,
        };
        for _ in 0..100 {
            let delay = delay_for_attempt(&config, 5);
            assert!((1000..1050).contains(&delay));
        }
    }
}
