//! Sidecar client: the drop-in replacement for a direct pool handle used by
//! worker processes. Tracks outstanding requests with a deadline; a timer
//! firing removes the pending entry and surfaces a timeout to the caller
//! without waiting for a late response (spec §4.4, §8 scenario 5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ral_core::RalError;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};

use super::protocol::{IpcRequest, IpcResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

struct Pending {
    resolve: oneshot::Sender<Result<Value, String>>,
}

/// Connects to a running `SidecarServer`'s Unix domain socket and issues
/// requests, demultiplexing responses by request id on a background reader
/// task.
pub struct SidecarClient {
    writer: Mutex<tokio::net::unix::OwnedWriteHalf>,
    pending: Arc<Mutex<HashMap<String, Pending>>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl SidecarClient {
    /// # Errors
    /// Returns a classified error if the socket cannot be connected to.
    pub async fn connect(socket_path: &str) -> Result<Self, RalError> {
        Self::connect_with_timeout(socket_path, DEFAULT_TIMEOUT).await
    }

    /// # Errors
    /// Returns a classified error if the socket cannot be connected to.
    pub async fn connect_with_timeout(socket_path: &str, timeout: Duration) -> Result<Self, RalError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| RalError::classify("sidecar-client", e.to_string()))?;
        let (read_half, write_half) = stream.into_split();
        let pending: Arc<Mutex<HashMap<String, Pending>>> = Arc::new(Mutex::new(HashMap::new()));

        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(response) = serde_json::from_str::<IpcResponse>(&line) else {
                    continue;
                };
                if let Some(entry) = reader_pending.lock().await.remove(&response.id) {
                    let outcome = match response.error {
                        Some(message) => Err(message),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    };
                    let _ = entry.resolve.send(outcome);
                }
            }
        });

        Ok(Self {
            writer: Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            timeout,
        })
    }

    /// Issue `method` with `params` and await the matching response,
    /// racing the client's configured deadline.
    ///
    /// # Errors
    /// `RalError::Timeout` if no response arrives before the deadline; the
    /// upstream-classified error if the server replied with one.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RalError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), Pending { resolve: tx });

        let request = IpcRequest {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        let mut encoded = serde_json::to_string(&request).map_err(|e| RalError::classify("sidecar-client", e.to_string()))?;
        encoded.push('\n');
        {
            let mut writer = self.writer.lock().await;
            if writer.write_all(encoded.as_bytes()).await.is_err() {
                self.pending.lock().await.remove(&id);
                return Err(RalError::Closed);
            }
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(RalError::classify(method, message)),
            Ok(Err(_)) => Err(RalError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(RalError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use tokio::net::UnixListener;

    fn socket_path(name: &str) -> String {
        format!("/tmp/ral-sidecar-test-{name}-{}.sock", std::process::id())
    }

    #[tokio::test]
    async fn call_times_out_and_ignores_late_response() {
        let path = socket_path("timeout");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let server_path = path.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let write_half = StdArc::new(Mutex::new(write_half));
            if let Ok(Some(line)) = lines.next_line().await {
                let request: IpcRequest = serde_json::from_str(&line).unwrap();
                let writer = StdArc::clone(&write_half);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    let response = IpcResponse::ok(request.id, serde_json::json!({"late": true}));
                    let mut encoded = serde_json::to_string(&response).unwrap();
                    encoded.push('\n');
                    let _ = writer.lock().await.write_all(encoded.as_bytes()).await;
                });
            }
            let _ = server_path;
            std::future::pending::<()>().await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let client = SidecarClient::connect_with_timeout(&path, Duration::from_millis(100)).await.unwrap();
        let result = client.call("getAccountInfo", serde_json::json!({"publicKey": "abc"})).await;
        assert!(matches!(result, Err(RalError::Timeout)));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(client.pending.lock().await.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
