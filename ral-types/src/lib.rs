//! Shared configuration and wire-level data types for the RPC Access Layer.
//!
//! This crate has no I/O and no async runtime dependency; it only describes
//! the shapes that flow between the connection pool, the websocket
//! supervisor, the sidecar protocol, and the DEX aggregation query.

mod commitment;
mod config;
mod error;
mod pool_type;
mod quote;

pub use commitment::Commitment;
pub use config::{EndpointConfig, RateLimitConfig, ReconnectConfig};
pub use error::{RalErrorKind, UpstreamKind};
pub use pool_type::PoolType;
pub use quote::{DexComparisonEntry, DexComparisonEvent, Quote, RouteHop, SwapOutcome};
