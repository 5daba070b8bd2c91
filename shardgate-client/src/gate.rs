use std::sync::Arc;

use protocol::message::{
    BatchResult, BatchStatement, BeginResponse, ClusterStatus, Envelope, ExecuteResult,
    MessageType, QueryResult, TransactionOptions,
};
use protocol::{SqlValue, WireError};
use tracing::instrument;

use crate::rpc::{ClientConfig, ClientError, RpcClient};

/// High-level client for a shardgate gate (or, with SHARD_* messages, a
/// single tablet).
#[derive(Clone)]
pub struct GateClient {
    rpc: Arc<RpcClient>,
}

impl GateClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            rpc: Arc::new(RpcClient::new(config)?),
        })
    }

    pub fn from_rpc(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.rpc.connect().await
    }

    pub fn disconnect(&self) {
        self.rpc.disconnect()
    }

    #[instrument(skip(self, params))]
    pub async fn query(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<QueryResult, ClientError> {
        let request = Envelope::request(MessageType::Query).with_sql(sql, params);
        let response = self.rpc.send(&request).await?;
        Ok(response.decode_result()?)
    }

    #[instrument(skip(self, params))]
    pub async fn execute(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<ExecuteResult, ClientError> {
        let request = Envelope::request(MessageType::Execute).with_sql(sql, params);
        let response = self.rpc.send(&request).await?;
        Ok(response.decode_result()?)
    }

    pub async fn batch(
        &self,
        statements: Vec<BatchStatement>,
    ) -> Result<BatchResult, ClientError> {
        let mut request = Envelope::request(MessageType::Batch);
        request.statements = Some(statements);
        let response = self.rpc.send(&request).await?;
        Ok(response.decode_result()?)
    }

    /// BEGIN on the given keyspace; the returned handle carries the gate
    /// transaction id on every statement.
    pub async fn begin(
        &self,
        keyspace: Option<&str>,
        options: TransactionOptions,
    ) -> Result<GateTransaction, ClientError> {
        let mut request = Envelope::request(MessageType::Begin);
        request.keyspace = keyspace.map(str::to_string);
        request.options = Some(options);
        let response = self.rpc.send(&request).await?;
        let begun: BeginResponse = response.decode_result()?;
        Ok(GateTransaction {
            rpc: self.rpc.clone(),
            tx_id: begun.tx_id,
            shards: begun.shards,
        })
    }

    pub async fn status(&self) -> Result<ClusterStatus, ClientError> {
        let response = self.rpc.send(&Envelope::request(MessageType::Status)).await?;
        Ok(response.decode_result()?)
    }

    pub async fn vschema(&self) -> Result<serde_json::Value, ClientError> {
        let response = self
            .rpc
            .send(&Envelope::request(MessageType::VSchema))
            .await?;
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

/// Remote transaction handle: thin wrappers carrying the txId returned by
/// BEGIN. Commit and rollback consume the handle.
pub struct GateTransaction {
    rpc: Arc<RpcClient>,
    tx_id: String,
    shards: Vec<String>,
}

impl GateTransaction {
    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn shards(&self) -> &[String] {
        &self.shards
    }

    pub async fn query(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<QueryResult, ClientError> {
        let request = Envelope::request(MessageType::Query)
            .with_sql(sql, params)
            .with_tx(&self.tx_id);
        let response = self.rpc.send(&request).await?;
        Ok(response.decode_result()?)
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<ExecuteResult, ClientError> {
        let request = Envelope::request(MessageType::Execute)
            .with_sql(sql, params)
            .with_tx(&self.tx_id);
        let response = self.rpc.send(&request).await?;
        Ok(response.decode_result()?)
    }

    pub async fn commit(self) -> Result<(), ClientError> {
        let request = Envelope::request(MessageType::Commit).with_tx(&self.tx_id);
        let response = self.rpc.send(&request).await?;
        expect_ack(&response)
    }

    pub async fn rollback(self) -> Result<(), ClientError> {
        let request = Envelope::request(MessageType::Rollback).with_tx(&self.tx_id);
        let response = self.rpc.send(&request).await?;
        expect_ack(&response)
    }
}

fn expect_ack(response: &Envelope) -> Result<(), ClientError> {
    match response.message_type {
        MessageType::Ack | MessageType::Result => Ok(()),
        other => Err(ClientError::Application(WireError::new(
            protocol::ErrorCode::QueryError,
            format!("expected ACK, got {other:?}"),
        ))),
    }
}
