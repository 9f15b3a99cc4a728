//! Sidecar server: exposes a `ConnectionPool` (and optionally a DEX
//! aggregator) to worker processes over a Unix domain socket (IPC) and a
//! local websocket (subscription control), demultiplexing subscriptions
//! through `SubscriptionMux` (spec §4.4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use ral_core::{RalError, SubscriptionFilter};
use ral_types::Commitment;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::dex::DexAggregator;
use crate::pool::ConnectionPool;
use crate::streaming::SupervisorHandle;

use super::mux::SubscriptionMux;
use super::protocol::{IpcRequest, IpcResponse, WsClientFrame, WsServerFrame};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared state behind both the IPC and websocket listeners.
pub struct SidecarServer {
    pool: Arc<ConnectionPool>,
    supervisor: Option<SupervisorHandle>,
    dex: Option<Arc<DexAggregator>>,
    mux: SubscriptionMux,
}

impl SidecarServer {
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, supervisor: Option<SupervisorHandle>, dex: Option<Arc<DexAggregator>>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            supervisor,
            dex,
            mux: SubscriptionMux::new(),
        })
    }

    /// Bind the Unix domain socket and serve IPC requests until the process
    /// exits. Removes a stale socket file left by an unclean previous
    /// shutdown before binding (spec §6: "socket file is a runtime
    /// artifact, removed on clean shutdown").
    ///
    /// # Errors
    /// Returns a classified error if the socket cannot be bound.
    pub async fn run_ipc(self: &Arc<Self>, socket_path: &str) -> Result<(), RalError> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path).map_err(|e| RalError::classify("sidecar-ipc", e.to_string()))?;
        loop {
            let (stream, _) = listener.accept().await.map_err(|e| RalError::classify("sidecar-ipc", e.to_string()))?;
            let server = Arc::clone(self);
            tokio::spawn(async move {
                server.handle_ipc_connection(stream).await;
            });
        }
    }

    async fn handle_ipc_connection(self: Arc<Self>, stream: tokio::net::UnixStream) {
        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));
        let mut lines = BufReader::new(read_half).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            let server = Arc::clone(&self);
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                let response = match serde_json::from_str::<IpcRequest>(&line) {
                    Ok(request) => {
                        let id = request.id.clone();
                        match server.dispatch(&request.method, request.params).await {
                            Ok(result) => IpcResponse::ok(id, result),
                            Err(err) => IpcResponse::err(id, err.to_string()),
                        }
                    }
                    Err(err) => IpcResponse::err(String::new(), format!("Invalid params: malformed request ({err})")),
                };
                if let Ok(mut encoded) = serde_json::to_string(&response) {
                    encoded.push('\n');
                    let mut guard = writer.lock().await;
                    let _ = guard.write_all(encoded.as_bytes()).await;
                }
            });
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RalError> {
        use ral_types::PoolType;

        match method {
            "ping" => Ok(json!({"pong": true, "timestamp": Utc::now().timestamp_millis()})),
            "getHealthStatus" => Ok(self.health_status().await),
            "getAccountInfo" | "getMultipleAccounts" | "getTransaction" | "getLatestBlockhash" | "getBalance"
            | "confirmTransaction" | "getTokenAccountBalance" => {
                let method = method.to_string();
                self.pool
                    .execute_with_retry(PoolType::Query, move |transport| {
                        let method = method.clone();
                        let params = params.clone();
                        async move { transport.call(&method, params).await }
                    })
                    .await
            }
            "sendRawTransaction" => {
                self.pool
                    .execute_with_retry(PoolType::Submit, move |transport| {
                        let params = params.clone();
                        async move { transport.call("sendRawTransaction", params).await }
                    })
                    .await
            }
            "getBestQuote" => self.get_best_quote(&params).await,
            other => Err(RalError::classify(other, format!("Invalid params: unknown method {other}"))),
        }
    }

    async fn get_best_quote(&self, params: &Value) -> Result<Value, RalError> {
        let dex = self.dex.as_ref().ok_or_else(|| RalError::classify("sidecar-ipc", "Invalid params: DEX aggregation is not configured"))?;
        let input_mint = params.get("inputMint").and_then(Value::as_str).unwrap_or_default();
        let output_mint = params.get("outputMint").and_then(Value::as_str).unwrap_or_default();
        let amount = params.get("amount").and_then(Value::as_str).unwrap_or_default();
        let quote = dex.get_best_quote(input_mint, output_mint, amount).await?;
        serde_json::to_value(quote).map_err(|e| RalError::classify("sidecar-ipc", e.to_string()))
    }

    async fn health_status(&self) -> Value {
        let snapshot = self.pool.registry().snapshot().await;
        json!({
            "endpoints": snapshot.iter().map(|record| json!({
                "url": record.url,
                "healthy": record.is_healthy(),
                "activeRequests": record.active_requests(),
                "totalRequests": record.total_requests(),
            })).collect::<Vec<_>>(),
        })
    }

    /// Bind a local TCP listener and serve the websocket subscription
    /// protocol until the process exits.
    ///
    /// # Errors
    /// Returns a classified error if the address cannot be bound.
    pub async fn run_ws(self: &Arc<Self>, addr: &str) -> Result<(), RalError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| RalError::classify("sidecar-ws", e.to_string()))?;
        loop {
            let (stream, _) = listener.accept().await.map_err(|e| RalError::classify("sidecar-ws", e.to_string()))?;
            let server = Arc::clone(self);
            tokio::spawn(async move {
                server.handle_ws_connection(stream).await;
            });
        }
    }

    async fn handle_ws_connection(self: Arc<Self>, stream: tokio::net::TcpStream) {
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        let (mut sink, mut stream) = ws.split();
        let Some(supervisor) = self.supervisor.as_ref() else {
            let _ = sink.close().await;
            return;
        };

        let mut notifications = supervisor.notifications();
        loop {
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_client_frame(client_id, &text).await {
                                if sink.send(Message::Text(serde_json::to_string(&reply).unwrap_or_default())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                notice = notifications.recv() => {
                    if let Ok(crate::streaming::SupervisorNotification::Event { data, .. }) = notice {
                        let channel = data.get("channel").and_then(Value::as_str).unwrap_or_default();
                        if self.mux.client_count(channel).await > 0 {
                            let frame = WsServerFrame::Event { channel: channel.to_string(), data };
                            if sink.send(Message::Text(serde_json::to_string(&frame).unwrap_or_default())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.mux.remove_client(supervisor, client_id).await;
    }

    async fn handle_client_frame(&self, client_id: u64, text: &str) -> Option<WsServerFrame> {
        let supervisor = self.supervisor.as_ref()?;
        let frame: WsClientFrame = serde_json::from_str(text).ok()?;
        match frame {
            WsClientFrame::Subscribe { channel, params } => {
                let filter = parse_filter(&channel, &params)?;
                match self.mux.subscribe(supervisor, client_id, filter, Commitment::Confirmed).await {
                    Ok(channel) => Some(WsServerFrame::Subscribed { channel }),
                    Err(err) => Some(WsServerFrame::Error { channel, message: err.to_string() }),
                }
            }
            WsClientFrame::Unsubscribe { channel } => {
                self.mux.unsubscribe(supervisor, client_id, &channel).await;
                Some(WsServerFrame::Unsubscribed { channel })
            }
        }
    }
}

fn parse_filter(channel: &str, params: &Value) -> Option<SubscriptionFilter> {
    if let Some(address) = channel.strip_prefix("account:") {
        return Some(SubscriptionFilter::Account { address: address.to_string() });
    }
    if let Some(filter) = channel.strip_prefix("logs:") {
        return Some(SubscriptionFilter::Logs { filter: filter.to_string() });
    }
    if let Some(program_id) = channel.strip_prefix("program:") {
        return Some(SubscriptionFilter::ProgramAccounts { program_id: program_id.to_string() });
    }
    params.get("address").and_then(Value::as_str).map(|address| SubscriptionFilter::Account {
        address: address.to_string(),
    })
}
