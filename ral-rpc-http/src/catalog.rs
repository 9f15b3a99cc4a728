use ral_types::RateLimitConfig;

/// Known-provider rate-limit defaults (spec §4.1): URL substring matched
/// against an endpoint's configured URL, first match wins. Explicit
/// per-endpoint config always overrides these.
const PREMIUM_PROVIDERS: &[&str] = &["helius", "quicknode", "alchemy", "triton"];
const PUBLIC_PROVIDERS: &[&str] = &["api.mainnet-beta.solana.com", "api.devnet.solana.com", "api.testnet.solana.com"];

const PREMIUM_DEFAULT: RateLimitConfig = RateLimitConfig {
    max_requests: 100,
    window_ms: 1000,
};
const PUBLIC_DEFAULT: RateLimitConfig = RateLimitConfig {
    max_requests: 20,
    window_ms: 1000,
};
const UNKNOWN_DEFAULT: RateLimitConfig = RateLimitConfig {
    max_requests: 10,
    window_ms: 1000,
};

/// Look up a sane rate-limit default for `url` by substring match against
/// the known-provider catalog, falling back to the conservative unknown
/// default.
#[must_use]
pub fn default_rate_limit_for(url: &str) -> RateLimitConfig {
    if PREMIUM_PROVIDERS.iter().any(|needle| url.contains(needle)) {
        PREMIUM_DEFAULT
    } else if PUBLIC_PROVIDERS.iter().any(|needle| url.contains(needle)) {
        PUBLIC_DEFAULT
    } else {
        UNKNOWN_DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_premium_provider_by_substring() {
        let cfg = default_rate_limit_for("https://rpc.helius.xyz/?api-key=abc");
        assert_eq!(cfg.max_requests, 100);
    }

    #[test]
    fn matches_public_provider_by_substring() {
        let cfg = default_rate_limit_for("https://api.mainnet-beta.solana.com");
        assert_eq!(cfg.max_requests, 20);
    }

    #[test]
    fn falls_back_to_unknown_default() {
        let cfg = default_rate_limit_for("https://my-private-node.example.com");
        assert_eq!(cfg.max_requests, 10);
    }
}
