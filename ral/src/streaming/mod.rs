//! Websocket supervisor: owns one live socket per websocket endpoint,
//! tracks a registry of logical subscriptions, detects disconnection,
//! reconnects with bounded exponential backoff, and re-subscribes every
//! live entry on the new socket so callers' handles stay valid.

mod backoff;
mod sm;

use std::collections::HashMap;
use std::time::Duration;

use ral_core::{HandleAllocator, RalError, Subscription, SubscriptionFilter};
use ral_rpc_http::WsConnection;
use ral_types::{Commitment, ReconnectConfig};
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

/// Low-cost RPC used to probe the live websocket for silent disconnects
/// (spec §4.3 mechanism (a)); a send failure is treated identically to a
/// transport close/error (mechanism (b)).
const HEALTH_PROBE_METHOD: &str = "getVersion";
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Pushed to every subscriber of `SupervisorHandle::notifications()`.
#[derive(Debug, Clone)]
pub enum SupervisorNotification {
    Reconnecting { attempt: u32, delay_ms: u64 },
    Reconnected { attempts: u32 },
    Failed { message: String },
    /// An event frame addressed to `handle`, forwarded verbatim.
    Event { handle: u64, data: serde_json::Value },
}

enum Command {
    Subscribe {
        filter: SubscriptionFilter,
        commitment: Commitment,
        reply: oneshot::Sender<u64>,
    },
    Unsubscribe {
        handle: u64,
    },
    Shutdown,
}

/// Handle to a running supervisor task. Cloning is cheap; every clone talks
/// to the same background task.
#[derive(Clone)]
pub struct SupervisorHandle {
    cmd_tx: mpsc::Sender<Command>,
    notify_tx: broadcast::Sender<SupervisorNotification>,
}

impl SupervisorHandle {
    /// Spawn the supervisor's background task, which immediately attempts
    /// to connect to `url`.
    #[must_use]
    pub fn spawn(url: String, reconnect: ReconnectConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (notify_tx, _) = broadcast::channel(256);
        let notify_tx_task = notify_tx.clone();
        tokio::spawn(run(url, reconnect, cmd_rx, notify_tx_task));
        Self { cmd_tx, notify_tx }
    }

    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<SupervisorNotification> {
        self.notify_tx.subscribe()
    }

    /// # Errors
    /// `RalError::Closed` if the supervisor task has already exited.
    pub async fn subscribe(&self, filter: SubscriptionFilter, commitment: Commitment) -> Result<u64, RalError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Subscribe { filter, commitment, reply })
            .await
            .map_err(|_| RalError::Closed)?;
        rx.await.map_err(|_| RalError::Closed)
    }

    /// # Errors
    /// `RalError::Closed` if the supervisor task has already exited.
    pub async fn unsubscribe(&self, handle: u64) -> Result<(), RalError> {
        self.cmd_tx.send(Command::Unsubscribe { handle }).await.map_err(|_| RalError::Closed)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }
}

pub(crate) fn channel_name(filter: &SubscriptionFilter) -> String {
    match filter {
        SubscriptionFilter::Account { address } => format!("account:{address}"),
        SubscriptionFilter::Logs { filter } => format!("logs:{filter}"),
        SubscriptionFilter::ProgramAccounts { program_id } => format!("program:{program_id}"),
    }
}

async fn send_health_probe(conn: &mut WsConnection) -> Result<(), RalError> {
    let frame = json!({"jsonrpc": "2.0", "id": "health-probe", "method": HEALTH_PROBE_METHOD, "params": []});
    conn.send_text(frame.to_string()).await
}

async fn send_subscribe_frame(conn: &mut WsConnection, handle: u64, filter: &SubscriptionFilter) -> Result<(), RalError> {
    let frame = json!({
        "type": "subscribe",
        "channel": channel_name(filter),
        "params": {"handle": handle},
    });
    conn.send_text(frame.to_string()).await
}

/// Outcome of driving the pure state machine: the reconnect deadline to
/// arm, if `ScheduleReconnect` was among the emitted actions.
fn apply(
    outcome: (sm::Supervisor, Vec<sm::Action>),
    supervisor: &mut sm::Supervisor,
    notify_tx: &broadcast::Sender<SupervisorNotification>,
) -> Option<Instant> {
    let (next, actions) = outcome;
    *supervisor = next;
    let mut deadline = None;
    for action in actions {
        match action {
            sm::Action::EmitReconnecting { attempt, delay_ms } => {
                let _ = notify_tx.send(SupervisorNotification::Reconnecting { attempt, delay_ms });
            }
            sm::Action::EmitReconnected { attempts } => {
                let _ = notify_tx.send(SupervisorNotification::Reconnected { attempts });
            }
            sm::Action::EmitFailed { message } => {
                let _ = notify_tx.send(SupervisorNotification::Failed { message });
            }
            sm::Action::ScheduleReconnect { delay_ms } => {
                deadline = Some(Instant::now() + Duration::from_millis(delay_ms));
            }
            sm::Action::ResubscribeAll | sm::Action::OpenSocket | sm::Action::CloseSocket => {}
        }
    }
    deadline
}

fn forward_event(text: &str, notify_tx: &broadcast::Sender<SupervisorNotification>) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    if value.get("id").and_then(serde_json::Value::as_str) == Some("health-probe") {
        return;
    }
    let handle = value.get("params").and_then(|p| p.get("handle")).and_then(serde_json::Value::as_u64).unwrap_or(0);
    let _ = notify_tx.send(SupervisorNotification::Event { handle, data: value });
}

async fn try_reconnect(
    url: &str,
    subscriptions: &HashMap<u64, Subscription>,
) -> Result<WsConnection, RalError> {
    let mut conn = WsConnection::connect(url).await?;
    for sub in subscriptions.values() {
        let _ = send_subscribe_frame(&mut conn, sub.handle, &sub.filter).await;
    }
    Ok(conn)
}

#[allow(clippy::too_many_lines)]
async fn run(
    url: String,
    reconnect: ReconnectConfig,
    mut cmd_rx: mpsc::Receiver<Command>,
    notify_tx: broadcast::Sender<SupervisorNotification>,
) {
    let mut supervisor = sm::Supervisor::new(reconnect);
    let mut conn: Option<WsConnection> = None;
    let mut subscriptions: HashMap<u64, Subscription> = HashMap::new();
    let handles = HandleAllocator::new();
    let mut reconnect_deadline: Option<Instant> = None;
    let mut health_probe = tokio::time::interval(HEALTH_PROBE_INTERVAL);
    health_probe.reset();

    supervisor.phase = sm::Phase::Connecting { attempt: 0 };
    match WsConnection::connect(&url).await {
        Ok(c) => {
            conn = Some(c);
            health_probe.reset();
            apply(supervisor.handle(sm::Event::ConnectSucceeded), &mut supervisor, &notify_tx);
        }
        Err(err) => {
            reconnect_deadline = apply(
                supervisor.handle(sm::Event::ConnectFailed { message: err.to_string() }),
                &mut supervisor,
                &notify_tx,
            );
        }
    }

    loop {
        if matches!(supervisor.phase, sm::Phase::Disconnected | sm::Phase::Failed) {
            break;
        }

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(Command::Shutdown) => {
                        apply(supervisor.handle(sm::Event::Shutdown), &mut supervisor, &notify_tx);
                        break;
                    }
                    Some(Command::Subscribe { filter, commitment, reply }) => {
                        let handle = handles.allocate();
                        let mut sub = Subscription::new(handle, filter.clone(), commitment);
                        if let Some(c) = conn.as_mut() {
                            if send_subscribe_frame(c, handle, &filter).await.is_ok() {
                                sub.upstream_id = Some(handle);
                            }
                        }
                        subscriptions.insert(handle, sub);
                        let _ = reply.send(handle);
                    }
                    Some(Command::Unsubscribe { handle }) => {
                        subscriptions.remove(&handle);
                        if let Some(c) = conn.as_mut() {
                            let frame = json!({"type": "unsubscribe", "params": {"handle": handle}});
                            let _ = c.send_text(frame.to_string()).await;
                        }
                    }
                }
            }
            frame = async {
                match conn.as_mut() {
                    Some(c) => c.next_text().await,
                    None => std::future::pending().await,
                }
            } => {
                match frame {
                    Some(Ok(text)) => forward_event(&text, &notify_tx),
                    Some(Err(_)) | None => {
                        conn = None;
                        reconnect_deadline = apply(supervisor.handle(sm::Event::SocketClosed), &mut supervisor, &notify_tx);
                    }
                }
            }
            _ = health_probe.tick(), if conn.is_some() => {
                if let Some(c) = conn.as_mut() {
                    if send_health_probe(c).await.is_err() {
                        conn = None;
                        reconnect_deadline = apply(supervisor.handle(sm::Event::SocketClosed), &mut supervisor, &notify_tx);
                    }
                }
            }
            () = async {
                match reconnect_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            }, if reconnect_deadline.is_some() => {
                reconnect_deadline = None;
                apply(supervisor.handle(sm::Event::ReconnectTimerFired), &mut supervisor, &notify_tx);
                if matches!(supervisor.phase, sm::Phase::Connecting { .. }) {
                    match try_reconnect(&url, &subscriptions).await {
                        Ok(c) => {
                            conn = Some(c);
                            health_probe.reset();
                            apply(supervisor.handle(sm::Event::ConnectSucceeded), &mut supervisor, &notify_tx);
                        }
                        Err(err) => {
                            reconnect_deadline = apply(
                                supervisor.handle(sm::Event::ConnectFailed { message: err.to_string() }),
                                &mut supervisor,
                                &notify_tx,
                            );
                        }
                    }
                }
            }
        }
    }
}
