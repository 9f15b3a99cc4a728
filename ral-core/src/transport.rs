use async_trait::async_trait;
use serde_json::Value;

use crate::RalError;

/// Role trait for a single endpoint's raw JSON-RPC transport, implemented
/// concretely over HTTP (`ral-rpc-http`) or by fixtures (`ral-mock`).
///
/// A transport knows nothing about pooling, scoring, or retries; those live
/// in `ral`'s `ConnectionPool`, which holds one `RpcTransport` per endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// The endpoint URL this transport talks to, used for logging and
    /// `AllAttemptsFailed` reporting.
    fn url(&self) -> &str;

    /// Issue a single JSON-RPC call and return its `result` value.
    ///
    /// Implementations must translate a JSON-RPC error object into
    /// `RalError::classify` (or a more specific variant) rather than
    /// returning it inside `Ok`.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RalError>;
}

/// Role trait for a single DEX's quote source, implemented concretely by
/// HTTP aggregators (`ral-rpc-http`) or by fixtures (`ral-mock`).
#[async_trait]
pub trait DexProvider: Send + Sync {
    /// Stable provider name used in `Quote::provider` and tie-breaking.
    fn name(&self) -> &str;

    /// Fetch a quote for swapping `input_amount` (base units, decimal
    /// string) of `input_mint` into `output_mint`.
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        input_amount: &str,
    ) -> Result<ral_types::Quote, RalError>;

    /// Dispatch the swap `quote` describes, enforcing `max_slippage_bps`,
    /// and return the provider's outcome verbatim (spec §4.5). An `Err`
    /// here means the provider could not even be reached; a provider-level
    /// swap failure (e.g. slippage exceeded on-chain) is `Ok(SwapOutcome
    /// { success: false, .. })`.
    async fn execute_swap(&self, quote: &ral_types::Quote, max_slippage_bps: u32) -> Result<ral_types::SwapOutcome, RalError>;
}
