//! Serializable error kinds that cross the sidecar wire.
//!
//! `ral_core::RalError` is the rich, non-serializable error type used inside
//! the pool and supervisor. This type is its wire projection: every sidecar
//! response carries one of these alongside a human-readable message so
//! clients can branch on a stable discriminant instead of string-matching
//! (spec §9's redesign note on ad-hoc error strings).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a pass-through remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamKind {
    InvalidParams,
    NotFound,
    Transient,
}

/// The complete set of error kinds a caller of the RAL may observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "error_kind", rename_all = "snake_case")]
pub enum RalErrorKind {
    #[error("operation timed out")]
    Timeout,

    #[error("no endpoint available for the requested pool type")]
    NoEndpointAvailable,

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream error ({kind:?}): {message}")]
    UpstreamError { kind: UpstreamKind, message: String },

    #[error("pool is shutting down")]
    Closed,

    #[error("websocket supervisor has permanently failed")]
    WsDisconnected,

    #[error("no DEX provider returned a quote")]
    NoQuotesAvailable,

    #[error("all attempts failed across {} endpoint(s): {last_cause}", urls.len())]
    AllAttemptsFailed {
        attempts: u32,
        urls: Vec<String>,
        last_cause: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_stable_tag() {
        let err = RalErrorKind::UpstreamError {
            kind: UpstreamKind::NotFound,
            message: "account not found".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error_kind"], "upstream_error");
    }
}
