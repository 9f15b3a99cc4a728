use std::sync::Arc;

use ral::pool::ConnectionPool;
use ral::sidecar::SidecarServer;
use ral::streaming::SupervisorHandle;
use ral::RalConfig;
use ral_rpc_http::HttpRpcTransport;
use ral_types::ReconnectConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init()
        .ok();

    let config = RalConfig::from_env()?;

    let mut builder = ConnectionPool::builder().health_check_interval(config.health_check_interval);
    for endpoint in &config.query_endpoints {
        let transport = Arc::new(HttpRpcTransport::new(endpoint.url.clone()));
        builder = builder.with_endpoint(endpoint.clone(), transport);
    }
    let pool = Arc::new(builder.build().await?);
    pool.start_health_checker().await;

    let supervisor = config.ws_url.as_ref().map(|url| SupervisorHandle::spawn(url.clone(), ReconnectConfig::default()));

    let server = SidecarServer::new(Arc::clone(&pool), supervisor, None);

    let ipc_socket = config.sidecar_socket.clone();
    let ws_addr = ws_bind_addr(&config.sidecar_ws_url);

    let ipc_server = Arc::clone(&server);
    let ipc_task = tokio::spawn(async move { ipc_server.run_ipc(&ipc_socket).await });
    let ws_server = Arc::clone(&server);
    let ws_task = tokio::spawn(async move { ws_server.run_ws(&ws_addr).await });

    tracing::info!(socket = %config.sidecar_socket, ws = %config.sidecar_ws_url, "ral sidecar listening");

    tokio::select! {
        result = ipc_task => { result??; }
        result = ws_task => { result??; }
    }

    Ok(())
}

/// The sidecar's websocket URL is advertised to clients as `ws://host:port`;
/// the server binds the same host:port over plain TCP.
fn ws_bind_addr(ws_url: &str) -> String {
    ws_url
        .trim_start_matches("ws://")
        .trim_start_matches("wss://")
        .to_string()
}
