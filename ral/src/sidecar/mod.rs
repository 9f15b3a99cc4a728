//! Sidecar server/client: lets worker processes share one pool instance
//! over local IPC + websocket instead of linking it directly (spec §4.4).

mod client;
mod mux;
mod protocol;
mod server;

pub use client::SidecarClient;
pub use mux::{SubscriptionMux, UpstreamSubscriber};
pub use protocol::{IpcRequest, IpcResponse, WsClientFrame, WsServerFrame};
pub use server::SidecarServer;

