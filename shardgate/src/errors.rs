use protocol::{ErrorCode, WireError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no keyspace resolved for statement")]
    NoKeyspace,

    #[error("unsupported SQL: {0}")]
    UnsupportedSql(String),

    #[error("{0}")]
    ShardingKeyRequired(String),

    #[error("{0}")]
    ShardUnavailable(String),

    #[error("invalid vschema: {0}")]
    InvalidVSchema(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Transaction(String),

    #[error("{0}")]
    Query(String),

    /// A failure on one shard of a fan-out, wrapped with shard context.
    #[error("shard {shard}: {inner}")]
    Shard {
        shard: String,
        #[source]
        inner: Box<Error>,
    },

    /// Error surfaced by a remote tablet, classification preserved.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl Error {
    pub fn shard(shard: impl Into<String>, inner: Error) -> Self {
        Error::Shard {
            shard: shard.into(),
            inner: Box::new(inner),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NoKeyspace => ErrorCode::NoKeyspace,
            Error::UnsupportedSql(_) => ErrorCode::UnsupportedSql,
            Error::ShardingKeyRequired(_) => ErrorCode::ShardingKeyRequired,
            Error::ShardUnavailable(_) => ErrorCode::ShardUnavailable,
            Error::InvalidVSchema(_) => ErrorCode::QueryError,
            Error::Type(_) => ErrorCode::TypeError,
            Error::Transaction(_) => ErrorCode::TransactionError,
            Error::Query(_) => ErrorCode::QueryError,
            Error::Shard { inner, .. } => inner.code(),
            Error::Wire(wire) => wire.code,
        }
    }

    /// Wire form, with shard context folded into the payload.
    pub fn to_wire(&self) -> WireError {
        match self {
            Error::Shard { shard, inner } => inner.to_wire().with_shard(shard.clone()),
            Error::Wire(wire) => wire.clone(),
            other => WireError::new(other.code(), other.to_string()),
        }
    }
}
