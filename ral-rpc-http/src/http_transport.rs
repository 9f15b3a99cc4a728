use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ral_core::{RalError, RpcTransport};
use serde_json::{json, Value};

/// JSON-RPC-over-HTTP transport for a single endpoint, backed by `reqwest`.
pub struct HttpRpcTransport {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpRpcTransport {
    /// # Panics
    /// Panics if the underlying `reqwest` client fails to build, which only
    /// happens on a malformed TLS configuration.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    #[must_use]
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client config is valid");
        Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RalError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport_error(&self.url, &err))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RalError::RateLimited {
                endpoint: self.url.clone(),
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|err| RalError::classify(&self.url, format!("malformed JSON-RPC response: {err}")))?;

        if let Some(error) = envelope.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown upstream error")
                .to_string();
            return Err(RalError::classify(&self.url, message));
        }

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| RalError::classify(&self.url, "JSON-RPC response missing both result and error"))
    }
}

fn classify_transport_error(url: &str, err: &reqwest::Error) -> RalError {
    if err.is_timeout() {
        RalError::Timeout
    } else {
        RalError::classify(url, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_against_unreachable_host_is_transient() {
        let transport = HttpRpcTransport::with_timeout("http://127.0.0.1:1", Duration::from_millis(200));
        let err = transport.call("getHealth", json!([])).await.unwrap_err();
        assert!(!err.is_do_not_retry());
    }
}
