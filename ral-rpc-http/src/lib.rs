//! Concrete JSON-RPC-over-HTTP and websocket transports connecting the pool
//! and supervisor to real endpoints, plus the known-provider rate-limit
//! catalog.

mod catalog;
mod http_transport;
mod ws_transport;

pub use catalog::default_rate_limit_for;
pub use http_transport::HttpRpcTransport;
pub use ws_transport::WsConnection;
