//! DEX aggregation query: fan out a quote request to every enabled
//! provider, settle all of them (no cancellation on first failure), and
//! pick the best by output amount (spec §4.5).

use std::cmp::Ordering;
use std::sync::Arc;

use num_bigint::BigInt;
use ral_core::{publish_best_effort, DexProvider, EventBus, RalError};
use ral_types::{DexComparisonEntry, DexComparisonEvent, Quote};

const DEX_COMPARISON_CHANNEL: &str = "dex";
const DEX_COMPARISON_EVENT: &str = "DEX_QUOTE_COMPARISON";

/// Outcome of `executeSwap`: never an exception, always a tagged result
/// (spec §4.5).
#[derive(Debug, Clone)]
pub struct SwapResult {
    pub provider: String,
    pub success: bool,
    pub signature: Option<String>,
    pub error: Option<String>,
}

/// Holds the set of enabled DEX providers and the event bus comparison
/// events are published to.
pub struct DexAggregator {
    providers: Vec<Arc<dyn DexProvider>>,
    event_bus: Arc<dyn EventBus>,
}

impl DexAggregator {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn DexProvider>>, event_bus: Arc<dyn EventBus>) -> Self {
        Self { providers, event_bus }
    }

    /// Fan out to every enabled provider, settle all (partial-failure
    /// tolerant), select the maximum-output quote (ties broken by lower
    /// price impact, then provider name), and publish the comparison event.
    ///
    /// # Errors
    /// `RalError::NoQuotesAvailable` if every provider failed.
    pub async fn get_best_quote(&self, input_mint: &str, output_mint: &str, input_amount: &str) -> Result<Quote, RalError> {
        let attempts = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let input_mint = input_mint.to_string();
            let output_mint = output_mint.to_string();
            let input_amount = input_amount.to_string();
            async move {
                let result = provider.quote(&input_mint, &output_mint, &input_amount).await;
                (provider.name().to_string(), result)
            }
        });
        let outcomes = futures::future::join_all(attempts).await;

        let mut entries = Vec::with_capacity(outcomes.len());
        let mut quotes = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(quote) => {
                    entries.push(DexComparisonEntry {
                        provider: name,
                        out_amount: Some(quote.output_amount.clone()),
                        price_impact_bps: Some(quote.price_impact_bps),
                        error: None,
                    });
                    quotes.push(quote);
                }
                Err(err) => entries.push(DexComparisonEntry {
                    provider: name,
                    out_amount: None,
                    price_impact_bps: None,
                    error: Some(err.to_string()),
                }),
            }
        }

        let best = quotes.into_iter().max_by(compare_quotes);

        let event = DexComparisonEvent {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            input_amount: input_amount.to_string(),
            entries,
            selected_provider: best.as_ref().map(|q| q.provider.clone()),
        };
        let data = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        publish_best_effort(self.event_bus.as_ref(), DEX_COMPARISON_CHANNEL, DEX_COMPARISON_EVENT, data).await;

        best.ok_or(RalError::NoQuotesAvailable)
    }

    /// Dispatch a swap to the provider that produced `quote` and return its
    /// outcome verbatim (spec §4.5). Never raises: a provider that can't be
    /// reached at all is also translated into a `SwapResult` with
    /// `success=false` rather than propagated as an error.
    pub async fn execute_swap(&self, quote: &Quote, max_slippage_bps: u32) -> SwapResult {
        let Some(provider) = self.providers.iter().find(|p| p.name() == quote.provider) else {
            return SwapResult {
                provider: quote.provider.clone(),
                success: false,
                signature: None,
                error: Some(format!("no registered provider named {}", quote.provider)),
            };
        };

        match provider.execute_swap(quote, max_slippage_bps).await {
            Ok(outcome) => SwapResult {
                provider: quote.provider.clone(),
                success: outcome.success,
                signature: outcome.signature,
                error: outcome.error,
            },
            Err(err) => SwapResult {
                provider: quote.provider.clone(),
                success: false,
                signature: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Output amount as an arbitrary-precision integer, never a float (spec
/// §9): higher output wins, ties broken by lower price impact, then by
/// provider name ascending.
fn compare_quotes(a: &Quote, b: &Quote) -> Ordering {
    let a_amount = parse_amount(&a.output_amount);
    let b_amount = parse_amount(&b.output_amount);
    a_amount
        .cmp(&b_amount)
        .then_with(|| b.price_impact_bps.cmp(&a.price_impact_bps))
        .then_with(|| b.provider.cmp(&a.provider))
}

fn parse_amount(raw: &str) -> BigInt {
    raw.parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ral_middleware::InProcessEventBus;
    use ral_types::{RouteHop, SwapOutcome};
    use tokio::sync::Mutex as AsyncMutex;

    fn quote(provider: &str, out_amount: &str, impact_bps: u32) -> Quote {
        Quote {
            provider: provider.to_string(),
            input_mint: "IN".to_string(),
            output_mint: "OUT".to_string(),
            input_amount: "1000000".to_string(),
            output_amount: out_amount.to_string(),
            price_impact_bps: impact_bps,
            route: vec![RouteHop {
                provider: provider.to_string(),
                input: "IN".to_string(),
                output: "OUT".to_string(),
                percent: 100,
            }],
        }
    }

    struct FixedProvider {
        name: String,
        outcome: AsyncMutex<Option<Result<Quote, RalError>>>,
        swap_outcome: AsyncMutex<Option<Result<SwapOutcome, RalError>>>,
    }

    #[async_trait]
    impl DexProvider for FixedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn quote(&self, _input_mint: &str, _output_mint: &str, _input_amount: &str) -> Result<Quote, RalError> {
            self.outcome.lock().await.take().expect("quote called more than once")
        }

        async fn execute_swap(&self, _quote: &Quote, _max_slippage_bps: u32) -> Result<SwapOutcome, RalError> {
            self.swap_outcome.lock().await.take().expect("execute_swap called more than once")
        }
    }

    fn provider(name: &str, outcome: Result<Quote, RalError>) -> Arc<dyn DexProvider> {
        Arc::new(FixedProvider {
            name: name.to_string(),
            outcome: AsyncMutex::new(Some(outcome)),
            swap_outcome: AsyncMutex::new(None),
        })
    }

    fn swap_provider(name: &str, swap_outcome: Result<SwapOutcome, RalError>) -> Arc<dyn DexProvider> {
        Arc::new(FixedProvider {
            name: name.to_string(),
            outcome: AsyncMutex::new(None),
            swap_outcome: AsyncMutex::new(Some(swap_outcome)),
        })
    }

    #[tokio::test]
    async fn selects_highest_output_tie_broken_by_lower_impact() {
        let providers = vec![
            provider("Jupiter", Ok(quote("Jupiter", "1000000", 20))),
            provider("Orca", Ok(quote("Orca", "1050000", 40))),
            provider("Raydium", Err(RalError::classify("raydium", "connection refused"))),
            provider("Meteora", Ok(quote("Meteora", "1050000", 60))),
        ];
        let aggregator = DexAggregator::new(providers, Arc::new(InProcessEventBus::default()));

        let best = aggregator.get_best_quote("IN", "OUT", "1000000").await.unwrap();
        assert_eq!(best.provider, "Orca");
    }

    #[tokio::test]
    async fn fails_with_no_quotes_available_when_every_provider_errors() {
        let providers = vec![
            provider("Jupiter", Err(RalError::classify("jupiter", "timeout"))),
            provider("Orca", Err(RalError::classify("orca", "timeout"))),
        ];
        let aggregator = DexAggregator::new(providers, Arc::new(InProcessEventBus::default()));

        let result = aggregator.get_best_quote("IN", "OUT", "1000000").await;
        assert!(matches!(result, Err(RalError::NoQuotesAvailable)));
    }

    #[tokio::test]
    async fn execute_swap_never_raises_when_provider_is_unreachable() {
        let providers = vec![swap_provider("Jupiter", Err(RalError::classify("jupiter", "connection refused")))];
        let aggregator = DexAggregator::new(providers, Arc::new(InProcessEventBus::default()));
        let quote = quote("Jupiter", "1000000", 20);

        let result = aggregator.execute_swap(&quote, 50).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn execute_swap_surfaces_a_provider_level_failure_verbatim() {
        let providers = vec![swap_provider(
            "Jupiter",
            Ok(SwapOutcome {
                success: false,
                signature: None,
                error: Some("slippage tolerance exceeded".to_string()),
            }),
        )];
        let aggregator = DexAggregator::new(providers, Arc::new(InProcessEventBus::default()));
        let quote = quote("Jupiter", "1000000", 20);

        let result = aggregator.execute_swap(&quote, 50).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("slippage tolerance exceeded"));
    }

    #[tokio::test]
    async fn execute_swap_returns_the_providers_signature_on_success() {
        let providers = vec![swap_provider(
            "Jupiter",
            Ok(SwapOutcome {
                success: true,
                signature: Some("5x9abc".to_string()),
                error: None,
            }),
        )];
        let aggregator = DexAggregator::new(providers, Arc::new(InProcessEventBus::default()));
        let quote = quote("Jupiter", "1000000", 20);

        let result = aggregator.execute_swap(&quote, 50).await;
        assert!(result.success);
        assert_eq!(result.signature.as_deref(), Some("5x9abc"));
    }
}
