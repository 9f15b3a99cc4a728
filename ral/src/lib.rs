//! The RPC Access Layer: connection pool, websocket supervisor, sidecar
//! server/client, DEX aggregation, and the public facade.

pub mod config;
pub mod dex;
pub mod facade;
pub mod pool;
pub mod sidecar;
pub mod streaming;

pub use config::RalConfig;
pub use facade::Facade;
