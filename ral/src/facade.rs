//! Public facade: the stable surface workers call (spec §4.7). Routes
//! through a direct `ConnectionPool` or, when `USE_SIDECAR=true`, through a
//! `SidecarClient` talking to a shared sidecar process.

use std::sync::Arc;

use ral_core::{RalError, SubscriptionFilter};
use ral_types::{Commitment, PoolType};
use serde_json::{json, Value};

use crate::dex::{DexAggregator, SwapResult};
use crate::pool::ConnectionPool;
use crate::sidecar::SidecarClient;
use crate::streaming::SupervisorHandle;

enum Backend {
    Direct {
        pool: Arc<ConnectionPool>,
        supervisor: Option<SupervisorHandle>,
        dex: Option<Arc<DexAggregator>>,
    },
    Sidecar {
        client: SidecarClient,
    },
}

/// Stable surface exposed to workers (spec §4.7): account/transaction
/// reads, submission, subscriptions, health, and shutdown.
pub struct Facade {
    backend: Backend,
}

impl Facade {
    #[must_use]
    pub fn direct(pool: Arc<ConnectionPool>, supervisor: Option<SupervisorHandle>, dex: Option<Arc<DexAggregator>>) -> Self {
        Self {
            backend: Backend::Direct { pool, supervisor, dex },
        }
    }

    #[must_use]
    pub fn sidecar(client: SidecarClient) -> Self {
        Self {
            backend: Backend::Sidecar { client },
        }
    }

    async fn query(&self, method: &str, params: Value) -> Result<Value, RalError> {
        match &self.backend {
            Backend::Direct { pool, .. } => {
                let method = method.to_string();
                pool.execute_with_retry(PoolType::Query, move |transport| {
                    let method = method.clone();
                    let params = params.clone();
                    async move { transport.call(&method, params).await }
                })
                .await
            }
            Backend::Sidecar { client } => client.call(method, params).await,
        }
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn get_account_info(&self, public_key: &str) -> Result<Value, RalError> {
        self.query("getAccountInfo", json!({"publicKey": public_key})).await
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn get_multiple_accounts(&self, public_keys: &[String]) -> Result<Value, RalError> {
        self.query("getMultipleAccounts", json!({"publicKeys": public_keys})).await
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn get_transaction(&self, signature: &str) -> Result<Value, RalError> {
        self.query("getTransaction", json!({"signature": signature})).await
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn get_latest_blockhash(&self) -> Result<Value, RalError> {
        self.query("getLatestBlockhash", json!({})).await
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn get_balance(&self, public_key: &str) -> Result<Value, RalError> {
        self.query("getBalance", json!({"publicKey": public_key})).await
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn get_token_account_balance(&self, token_account: &str) -> Result<Value, RalError> {
        self.query("getTokenAccountBalance", json!({"tokenAccount": token_account})).await
    }

    /// Always dispatched through the submit pool, never the query pool
    /// (spec §4.7).
    ///
    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn send_raw_transaction(&self, transaction_base64: &str, options: Option<Value>) -> Result<Value, RalError> {
        let params = json!({"transaction": transaction_base64, "options": options.unwrap_or(Value::Null)});
        match &self.backend {
            Backend::Direct { pool, .. } => {
                pool.execute_with_retry(PoolType::Submit, move |transport| {
                    let params = params.clone();
                    async move { transport.call("sendRawTransaction", params).await }
                })
                .await
            }
            Backend::Sidecar { client } => client.call("sendRawTransaction", params).await,
        }
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn confirm_transaction(&self, signature: &str, commitment: Option<Commitment>) -> Result<Value, RalError> {
        let params = json!({
            "signature": signature,
            "commitment": commitment.map(|c| c.to_string()),
        });
        self.query("confirmTransaction", params).await
    }

    /// # Errors
    /// `RalError::Closed` when using a direct backend without a websocket
    /// supervisor configured, or when the supervisor task has exited.
    pub async fn subscribe_account(&self, address: &str, commitment: Commitment) -> Result<u64, RalError> {
        self.subscribe(SubscriptionFilter::Account { address: address.to_string() }, commitment).await
    }

    /// # Errors
    /// `RalError::Closed` when using a direct backend without a websocket
    /// supervisor configured, or when the supervisor task has exited.
    pub async fn subscribe_logs(&self, filter: &str, commitment: Commitment) -> Result<u64, RalError> {
        self.subscribe(SubscriptionFilter::Logs { filter: filter.to_string() }, commitment).await
    }

    async fn subscribe(&self, filter: SubscriptionFilter, commitment: Commitment) -> Result<u64, RalError> {
        match &self.backend {
            Backend::Direct { supervisor: Some(supervisor), .. } => supervisor.subscribe(filter, commitment).await,
            Backend::Direct { supervisor: None, .. } => Err(RalError::Closed),
            Backend::Sidecar { client } => {
                let channel = match &filter {
                    SubscriptionFilter::Account { address } => format!("account:{address}"),
                    SubscriptionFilter::Logs { filter } => format!("logs:{filter}"),
                    SubscriptionFilter::ProgramAccounts { program_id } => format!("program:{program_id}"),
                };
                let response = client.call("subscribe", json!({"channel": channel})).await?;
                Ok(response.get("handle").and_then(Value::as_u64).unwrap_or(0))
            }
        }
    }

    /// # Errors
    /// `RalError::Closed` when using a direct backend without a websocket
    /// supervisor configured, or when the supervisor task has exited.
    pub async fn unsubscribe(&self, handle: u64) -> Result<(), RalError> {
        match &self.backend {
            Backend::Direct { supervisor: Some(supervisor), .. } => supervisor.unsubscribe(handle).await,
            Backend::Direct { supervisor: None, .. } => Err(RalError::Closed),
            Backend::Sidecar { client } => client.call("unsubscribe", json!({"handle": handle})).await.map(|_| ()),
        }
    }

    /// # Errors
    /// `RalError::NoQuotesAvailable` if every DEX provider failed, or
    /// `RalError::Closed` if DEX aggregation is not configured.
    pub async fn get_best_quote(&self, input_mint: &str, output_mint: &str, amount: &str) -> Result<ral_types::Quote, RalError> {
        match &self.backend {
            Backend::Direct { dex: Some(dex), .. } => dex.get_best_quote(input_mint, output_mint, amount).await,
            Backend::Direct { dex: None, .. } => Err(RalError::Closed),
            Backend::Sidecar { client } => {
                let params = json!({"inputMint": input_mint, "outputMint": output_mint, "amount": amount});
                let value = client.call("getBestQuote", params).await?;
                serde_json::from_value(value).map_err(|e| RalError::classify("facade", e.to_string()))
            }
        }
    }

    /// Dispatches to the provider that produced `quote`; never raises for
    /// swap failures (spec §4.5).
    pub async fn execute_swap(&self, quote: &ral_types::Quote, max_slippage_bps: u32) -> SwapResult {
        match &self.backend {
            Backend::Direct { dex: Some(dex), .. } => dex.execute_swap(quote, max_slippage_bps).await,
            _ => SwapResult {
                provider: quote.provider.clone(),
                success: false,
                signature: None,
                error: Some("DEX aggregation is not configured".to_string()),
            },
        }
    }

    /// # Errors
    /// Propagates the classified RPC error on failure.
    pub async fn health_status(&self) -> Result<Value, RalError> {
        self.query("getHealthStatus", json!({})).await
    }

    pub async fn close(&self) {
        if let Backend::Direct { pool, supervisor, .. } = &self.backend {
            pool.close().await;
            if let Some(supervisor) = supervisor {
                supervisor.shutdown().await;
            }
        }
    }
}
