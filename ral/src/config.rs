//! Environment-driven configuration (spec §6). Loaded once, validated at
//! construction, and never mutated afterward — no dynamic config objects.

use std::time::Duration;

use ral_core::RalError;
use ral_types::{Commitment, EndpointConfig, PoolType};

const DEFAULT_SIDECAR_SOCKET: &str = "/tmp/solana-rpc.sock";
const DEFAULT_SIDECAR_WS_URL: &str = "ws://localhost:3002";
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Fully resolved configuration for constructing a `Facade`.
#[derive(Debug, Clone)]
pub struct RalConfig {
    pub query_endpoints: Vec<EndpointConfig>,
    pub ws_url: Option<String>,
    pub commitment: Commitment,
    pub health_check_interval: Duration,
    pub use_sidecar: bool,
    pub sidecar_socket: String,
    pub sidecar_ws_url: String,
}

impl RalConfig {
    /// Load configuration from the process environment, applying the
    /// defaults of spec §6 and rejecting malformed values rather than
    /// silently falling back.
    ///
    /// # Errors
    /// Returns a classified error if `SOLANA_COMMITMENT` is set to an
    /// unrecognized value, or if neither `SOLANA_RPC_URL` nor
    /// `SOLANA_RPC_URLS` is set.
    pub fn from_env() -> Result<Self, RalError> {
        Self::from_env_source(|key| std::env::var(key).ok())
    }

    /// Testable indirection over `std::env::var` so config-loading tests
    /// don't depend on process-global environment state.
    pub fn from_env_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, RalError> {
        let urls: Vec<String> = if let Some(urls) = get("SOLANA_RPC_URLS") {
            urls.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
        } else if let Some(url) = get("SOLANA_RPC_URL") {
            vec![url]
        } else {
            Vec::new()
        };

        if urls.is_empty() {
            return Err(RalError::classify(
                "config",
                "neither SOLANA_RPC_URL nor SOLANA_RPC_URLS is set",
            ));
        }

        let query_endpoints = urls
            .into_iter()
            .enumerate()
            .map(|(priority, url)| {
                let rate_limit = ral_rpc_http_default_rate_limit(&url);
                EndpointConfig::new(url, priority as u32, [PoolType::Query, PoolType::Submit]).with_rate_limit(rate_limit)
            })
            .collect();

        let commitment = match get("SOLANA_COMMITMENT") {
            Some(raw) => Commitment::parse(&raw).map_err(|e| RalError::classify("config", e))?,
            None => Commitment::default(),
        };

        let health_check_interval = get("SOLANA_RPC_HEALTH_CHECK_INTERVAL")
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(DEFAULT_HEALTH_CHECK_INTERVAL, Duration::from_millis);

        let use_sidecar = get("USE_SIDECAR").is_some_and(|raw| raw.eq_ignore_ascii_case("true"));

        Ok(Self {
            query_endpoints,
            ws_url: get("SOLANA_WS_URL"),
            commitment,
            health_check_interval,
            use_sidecar,
            sidecar_socket: get("RPC_SIDECAR_SOCKET").unwrap_or_else(|| DEFAULT_SIDECAR_SOCKET.to_string()),
            sidecar_ws_url: get("RPC_SIDECAR_WS_URL").unwrap_or_else(|| DEFAULT_SIDECAR_WS_URL.to_string()),
        })
    }
}

fn ral_rpc_http_default_rate_limit(url: &str) -> ral_types::RateLimitConfig {
    ral_rpc_http::default_rate_limit_for(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn loads_single_url_and_defaults() {
        let cfg = RalConfig::from_env_source(env(&[("SOLANA_RPC_URL", "https://rpc.example")])).unwrap();
        assert_eq!(cfg.query_endpoints.len(), 1);
        assert_eq!(cfg.commitment, Commitment::Confirmed);
        assert!(!cfg.use_sidecar);
        assert_eq!(cfg.sidecar_socket, DEFAULT_SIDECAR_SOCKET);
    }

    #[test]
    fn splits_comma_separated_pool_urls() {
        let cfg = RalConfig::from_env_source(env(&[("SOLANA_RPC_URLS", "https://a, https://b")])).unwrap();
        assert_eq!(cfg.query_endpoints.len(), 2);
        assert_eq!(cfg.query_endpoints[1].url, "https://b");
    }

    #[test]
    fn rejects_unknown_commitment() {
        let result = RalConfig::from_env_source(env(&[
            ("SOLANA_RPC_URL", "https://rpc.example"),
            ("SOLANA_COMMITMENT", "bogus"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_rpc_url() {
        let result = RalConfig::from_env_source(env(&[]));
        assert!(result.is_err());
    }
}
