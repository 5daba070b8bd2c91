use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Canonical error codes carried on the wire.
///
/// The byte-stable wire form is the SCREAMING_SNAKE_CASE string; the set is
/// closed and shared by adapters, tablets, the router and clients.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConnectionError,
    QueryError,
    TransactionError,
    TypeError,
    ConstraintViolation,
    SyntaxError,
    NotReady,
    AlreadyClosed,
    ShardingKeyRequired,
    UnsupportedSql,
    NoKeyspace,
    TableNotFound,
    ShardUnavailable,
    DeadlockDetected,
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    Timeout,
    InvalidPlaceholder,
    MissingParam,
}

impl ErrorCode {
    /// Whether the client boundary may retry a request that failed with this
    /// code. Application-level failures are permanent for a given input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConnectionError | ErrorCode::Timeout | ErrorCode::ShardUnavailable
        )
    }
}

/// The ERROR message payload and the application error type surfaced to
/// callers of the client crate.
#[serde_with::skip_serializing_none]
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
    pub shard: Option<String>,
    pub sql_state: Option<String>,
}

impl WireError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            shard: None,
            sql_state: None,
        }
    }

    pub fn with_shard(mut self, shard: impl Into<String>) -> Self {
        self.shard = Some(shard.into());
        self
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }
}
