//! Typed RPC messages and the JSON-over-HTTP envelope.
//!
//! Every request and response is a single top-level object carrying the
//! common header (`type`, `id`, `timestamp`) plus type-specific payload
//! fields. Responses echo the request `id`; that is the only correlation
//! mechanism on a connection.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WireError;
use crate::value::{Row, SqlValue};

/// Closed message-type set. The byte values are part of the wire contract;
/// never renumber.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageType {
    Query = 0x01,
    Execute = 0x02,
    Batch = 0x03,
    Begin = 0x10,
    Commit = 0x11,
    Rollback = 0x12,
    Status = 0x20,
    Health = 0x21,
    Schema = 0x22,
    VSchema = 0x23,
    ShardQuery = 0x30,
    ShardExecute = 0x31,
    ShardBatch = 0x32,
    Result = 0x80,
    Error = 0x81,
    Ack = 0x82,
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(byte: u8) -> Result<Self, String> {
        use MessageType::*;
        Ok(match byte {
            0x01 => Query,
            0x02 => Execute,
            0x03 => Batch,
            0x10 => Begin,
            0x11 => Commit,
            0x12 => Rollback,
            0x20 => Status,
            0x21 => Health,
            0x22 => Schema,
            0x23 => VSchema,
            0x30 => ShardQuery,
            0x31 => ShardExecute,
            0x32 => ShardBatch,
            0x80 => Result,
            0x81 => Error,
            0x82 => Ack,
            other => return Err(format!("unknown message type {other:#04x}")),
        })
    }
}

/// SQL dialect tag attached to QUERY/EXECUTE payloads headed for a
/// SQLite-compatible tablet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Accepted for wire compatibility; Postgres silently promotes it to
    /// read-committed.
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// SQLite locking mode for BEGIN.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOptions {
    pub isolation: Option<IsolationLevel>,
    #[serde(default)]
    pub read_only: bool,
    pub timeout_ms: Option<u64>,
    pub mode: Option<TransactionMode>,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatement {
    pub sql: String,
    pub params: Option<Vec<SqlValue>>,
}

/// Column metadata: engine-native type id plus a portable type name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub type_id: i32,
    pub type_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub duration_ms: u64,
}

impl QueryResult {
    pub fn with_rows(fields: Vec<Field>, rows: Vec<Row>, duration_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            fields,
            rows,
            row_count,
            duration_ms,
        }
    }
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub affected: u64,
    pub last_insert_id: Option<i64>,
    pub duration_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: Vec<ExecuteResult>,
    pub duration_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BeginResponse {
    pub tx_id: String,
    pub shards: Vec<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ShardHealth {
    pub shard: String,
    pub healthy: bool,
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub keyspaces: Vec<String>,
    pub shards: Vec<ShardHealth>,
}

/// The single top-level wire object. Payload fields are optional and
/// omitted when absent; the `type` discriminant says which ones are
/// meaningful. RESULT payloads are carried as a raw tree and decoded by the
/// side that knows what it asked for.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub id: String,
    pub timestamp: i64,
    pub sql: Option<String>,
    pub params: Option<Vec<SqlValue>>,
    pub statements: Option<Vec<BatchStatement>>,
    pub keyspace: Option<String>,
    pub shard: Option<String>,
    pub tx_id: Option<String>,
    pub options: Option<TransactionOptions>,
    pub dialect: Option<Dialect>,
    pub result: Option<serde_json::Value>,
    pub error: Option<WireError>,
}

impl Envelope {
    /// Fresh request envelope with a generated id and current timestamp.
    pub fn request(message_type: MessageType) -> Self {
        Self {
            message_type,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            sql: None,
            params: None,
            statements: None,
            keyspace: None,
            shard: None,
            tx_id: None,
            options: None,
            dialect: None,
            result: None,
            error: None,
        }
    }

    fn reply(message_type: MessageType, request_id: &str) -> Self {
        Self {
            id: request_id.to_string(),
            ..Self::request(message_type)
        }
    }

    /// RESULT response carrying `payload`, correlated to `request_id`.
    pub fn result<T: Serialize>(request_id: &str, payload: &T) -> Self {
        let mut envelope = Self::reply(MessageType::Result, request_id);
        envelope.result =
            Some(serde_json::to_value(payload).expect("result payloads are always serializable"));
        envelope
    }

    /// ERROR response, correlated to `request_id`.
    pub fn error(request_id: &str, error: WireError) -> Self {
        let mut envelope = Self::reply(MessageType::Error, request_id);
        envelope.error = Some(error);
        envelope
    }

    /// Empty ACK response, correlated to `request_id`.
    pub fn ack(request_id: &str) -> Self {
        Self::reply(MessageType::Ack, request_id)
    }

    pub fn with_sql(mut self, sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        self.sql = Some(sql.into());
        self.params = Some(params);
        self
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn with_shard(mut self, shard: impl Into<String>) -> Self {
        self.shard = Some(shard.into());
        self
    }

    pub fn with_tx(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }

    /// Decode the RESULT payload into the shape the requester expects.
    pub fn decode_result<T: serde::de::DeserializeOwned>(&self) -> Result<T, WireError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let raw = self.result.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(raw).map_err(|e| {
            WireError::new(
                crate::error::ErrorCode::TypeError,
                format!("malformed result payload: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn message_type_bytes_are_stable() {
        assert_eq!(u8::from(MessageType::Query), 0x01);
        assert_eq!(u8::from(MessageType::VSchema), 0x23);
        assert_eq!(u8::from(MessageType::ShardBatch), 0x32);
        assert_eq!(u8::from(MessageType::Ack), 0x82);

        let json = serde_json::to_string(&MessageType::Result).unwrap();
        assert_eq!(json, "128");
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let err = serde_json::from_str::<MessageType>("66").unwrap_err();
        assert!(err.to_string().contains("unknown message type"));
    }

    #[test]
    fn envelope_omits_absent_payload_fields() {
        let envelope = Envelope::request(MessageType::Health);
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"type\":33"));
        assert!(!json.contains("sql"));
        assert!(!json.contains("txId"));
    }

    #[test]
    fn result_round_trip() {
        let payload = BeginResponse {
            tx_id: "tx-1".into(),
            shards: vec!["-80".into(), "80-".into()],
        };
        let envelope = Envelope::result("req-7", &payload);
        assert_eq!(envelope.id, "req-7");

        let decoded: BeginResponse = envelope.decode_result().unwrap();
        assert_eq!(decoded.tx_id, "tx-1");
        assert_eq!(decoded.shards.len(), 2);
    }

    #[test]
    fn decode_result_surfaces_wire_errors() {
        let envelope = Envelope::error("req-1", WireError::new(ErrorCode::NoKeyspace, "nope"));
        let outcome = envelope.decode_result::<BeginResponse>();
        assert_eq!(outcome.unwrap_err().code, ErrorCode::NoKeyspace);
    }
}
