use serde::{Deserialize, Serialize};

/// Purpose an endpoint is dedicated to. An endpoint may serve more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    /// Read-only RPC calls (account fetch, balance, blockhash, ...).
    Query,
    /// Transaction submission (`sendRawTransaction`, `confirmTransaction`).
    Submit,
    /// Websocket subscriptions (account/logs/program notifications).
    Websocket,
}

impl PoolType {
    /// Stable lowercase identifier used in logs and config parsing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Submit => "submit",
            Self::Websocket => "websocket",
        }
    }

    /// Parse a pool-type token, rejecting anything not in `{query, submit, websocket}`.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "query" => Ok(Self::Query),
            "submit" => Ok(Self::Submit),
            "websocket" => Ok(Self::Websocket),
            other => Err(format!("unknown pool type: {other}")),
        }
    }
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_known_values() {
        for pt in [PoolType::Query, PoolType::Submit, PoolType::Websocket] {
            assert_eq!(PoolType::parse(pt.as_str()).unwrap(), pt);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(PoolType::parse("archive").is_err());
    }
}
