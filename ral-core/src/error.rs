use thiserror::Error;

use ral_types::{RalErrorKind, UpstreamKind};

/// Rich, non-serializable error type used internally by the pool, the
/// websocket supervisor, and the DEX aggregation query.
///
/// `ral_types::RalErrorKind` is the serializable projection of this type that
/// crosses the sidecar wire; see `RalError::to_wire`.
#[derive(Debug, Error)]
pub enum RalError {
    /// An operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// No endpoint is registered for the requested pool type.
    #[error("no endpoint available for pool type {pool_type}")]
    NoEndpointAvailable { pool_type: &'static str },

    /// A downstream 429 (or equivalent) from upstream.
    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    /// Pass-through of a classified remote error.
    #[error("upstream error from {endpoint} ({kind:?}): {message}")]
    UpstreamError {
        endpoint: String,
        kind: UpstreamKind,
        message: String,
    },

    /// The pool or supervisor is shutting down.
    #[error("closed")]
    Closed,

    /// The websocket supervisor has permanently failed.
    #[error("websocket supervisor disconnected (terminal)")]
    WsDisconnected,

    /// Every DEX provider failed in `getBestQuote`.
    #[error("no DEX provider returned a quote")]
    NoQuotesAvailable,

    /// Every endpoint was attempted and failed.
    #[error("all attempts failed across {} endpoint(s); last cause: {last_cause}", urls.len())]
    AllAttemptsFailed {
        attempts: u32,
        urls: Vec<String>,
        last_cause: String,
    },
}

impl RalError {
    #[must_use]
    pub fn upstream(endpoint: impl Into<String>, kind: UpstreamKind, message: impl Into<String>) -> Self {
        Self::UpstreamError {
            endpoint: endpoint.into(),
            kind,
            message: message.into(),
        }
    }

    /// Classify a raw upstream error message per spec §4.2 step 3: exact
    /// substrings `Invalid params`, `Account not found`, `Block not found`
    /// short-circuit retry; anything else is transient and retried.
    #[must_use]
    pub fn classify(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if message.contains("Invalid params") {
            UpstreamKind::InvalidParams
        } else if message.contains("Account not found") || message.contains("Block not found") {
            UpstreamKind::NotFound
        } else {
            UpstreamKind::Transient
        };
        Self::upstream(endpoint, kind, message)
    }

    /// Whether `executeWithRetry` should surface this immediately rather
    /// than back off and try another endpoint (spec §4.2 step 3).
    #[must_use]
    pub const fn is_do_not_retry(&self) -> bool {
        matches!(
            self,
            Self::UpstreamError {
                kind: UpstreamKind::InvalidParams | UpstreamKind::NotFound,
                ..
            }
        )
    }

    /// Project onto the serializable wire form sent over the sidecar.
    #[must_use]
    pub fn to_wire(&self) -> RalErrorKind {
        match self {
            Self::Timeout => RalErrorKind::Timeout,
            Self::NoEndpointAvailable { .. } => RalErrorKind::NoEndpointAvailable,
            Self::RateLimited { .. } => RalErrorKind::RateLimited,
            Self::UpstreamError { kind, message, .. } => RalErrorKind::UpstreamError {
                kind: *kind,
                message: message.clone(),
            },
            Self::Closed => RalErrorKind::Closed,
            Self::WsDisconnected => RalErrorKind::WsDisconnected,
            Self::NoQuotesAvailable => RalErrorKind::NoQuotesAvailable,
            Self::AllAttemptsFailed {
                attempts,
                urls,
                last_cause,
            } => RalErrorKind::AllAttemptsFailed {
                attempts: *attempts,
                urls: urls.clone(),
                last_cause: last_cause.clone(),
            },
        }
    }
}
