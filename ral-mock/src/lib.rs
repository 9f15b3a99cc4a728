//! Deterministic fixture-driven `RpcTransport` and `DexProvider`
//! implementations for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use ral_core::{DexProvider, RalError, RpcTransport};
use ral_types::{Quote, SwapOutcome};
use serde_json::Value;

/// A scripted response queue: each call to `call` pops the next entry, in
/// order. Panics if exhausted, so a test's expected call count is explicit.
pub struct MockTransport {
    url: String,
    responses: Mutex<VecDeque<Result<Value, RalError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_response(self, result: Value) -> Self {
        self.responses.lock().unwrap().push_back(Ok(result));
        self
    }

    #[must_use]
    pub fn with_error(self, err: RalError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RalError> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("MockTransport for {} exhausted its scripted responses", self.url))
    }
}

/// A `DexProvider` that always returns the same scripted quote, or fails if
/// configured to. `execute_swap` returns a scripted outcome if one was set
/// via `with_swap_outcome`, otherwise a default success.
pub struct MockDexProvider {
    name: String,
    outcome: Mutex<Option<Result<Quote, RalError>>>,
    swap_outcome: Mutex<Option<Result<SwapOutcome, RalError>>>,
}

impl MockDexProvider {
    #[must_use]
    pub fn succeeding(name: impl Into<String>, quote: Quote) -> Self {
        Self {
            name: name.into(),
            outcome: Mutex::new(Some(Ok(quote))),
            swap_outcome: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn failing(name: impl Into<String>, err: RalError) -> Self {
        Self {
            name: name.into(),
            outcome: Mutex::new(Some(Err(err))),
            swap_outcome: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_swap_outcome(self, result: Result<SwapOutcome, RalError>) -> Self {
        *self.swap_outcome.lock().unwrap() = Some(result);
        self
    }
}

#[async_trait]
impl DexProvider for MockDexProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, _input_mint: &str, _output_mint: &str, _input_amount: &str) -> Result<Quote, RalError> {
        self.outcome
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| panic!("MockDexProvider {} queried more than once", self.name))
    }

    async fn execute_swap(&self, _quote: &Quote, _max_slippage_bps: u32) -> Result<SwapOutcome, RalError> {
        self.swap_outcome.lock().unwrap().take().unwrap_or(Ok(SwapOutcome {
            success: true,
            signature: Some(format!("mock-signature-{}", self.name)),
            error: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_transport_returns_scripted_responses_in_order() {
        let transport = MockTransport::new("mock://a")
            .with_response(json!({"value": 1}))
            .with_error(RalError::Timeout);

        assert_eq!(transport.call("getX", json!([])).await.unwrap(), json!({"value": 1}));
        assert!(transport.call("getY", json!([])).await.is_err());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn mock_dex_provider_returns_its_quote_once() {
        let quote = Quote {
            provider: "mockdex".into(),
            input_mint: "SOL".into(),
            output_mint: "USDC".into(),
            input_amount: "1000000000".into(),
            output_amount: "150000000".into(),
            price_impact_bps: 5,
            route: vec![],
        };
        let provider = MockDexProvider::succeeding("mockdex", quote);
        let result = provider.quote("SOL", "USDC", "1000000000").await.unwrap();
        assert_eq!(result.output_amount, "150000000");
    }
}
