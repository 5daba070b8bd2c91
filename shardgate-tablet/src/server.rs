//! Thin RPC server exposing one storage adapter for one shard.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    body::Body,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::{Request, header::HeaderName};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::instrument;

use protocol::message::{BeginResponse, ClusterStatus, Envelope, MessageType, ShardHealth};
use protocol::{ErrorCode, WireError};

use crate::adapter::{AdapterError, StorageAdapter};

#[derive(Clone)]
pub struct TabletApp {
    adapter: Arc<dyn StorageAdapter>,
    keyspace: String,
    shard: String,
}

impl TabletApp {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        keyspace: impl Into<String>,
        shard: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            keyspace: keyspace.into(),
            shard: shard.into(),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }
}

pub fn app(env: TabletApp) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/rpc", post(rpc))
        .layer(
            ServiceBuilder::new()
                .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
                .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .extensions()
                            .get::<RequestId>()
                            .map(|value| value.header_value().to_str().unwrap_or_default())
                            .unwrap_or_default();

                        tracing::info_span!(
                            "HTTP",
                            http.method = %request.method(),
                            http.url = %request.uri(),
                            request_id = %request_id,
                        )
                    }),
                ),
        )
        .layer(Extension(env))
}

#[instrument(skip(env, request), fields(message_type = ?request.message_type, id = %request.id))]
async fn rpc(Extension(env): Extension<TabletApp>, Json(request): Json<Envelope>) -> Response {
    let response = dispatch(&env, &request).await.unwrap_or_else(|e| {
        tracing::error!("request {} failed: {e}", request.id);
        Envelope::error(&request.id, e)
    });
    Json(response).into_response()
}

async fn dispatch(env: &TabletApp, request: &Envelope) -> Result<Envelope, WireError> {
    // SHARD_* messages must name the shard this tablet serves.
    if matches!(
        request.message_type,
        MessageType::ShardQuery | MessageType::ShardExecute | MessageType::ShardBatch
    ) {
        match request.shard.as_deref() {
            Some(shard) if shard == env.shard => {}
            Some(shard) => {
                return Err(WireError::new(
                    ErrorCode::ShardUnavailable,
                    format!("this tablet serves shard {}, not {shard}", env.shard),
                )
                .with_shard(shard.to_string()));
            }
            None => {
                return Err(WireError::new(
                    ErrorCode::ShardUnavailable,
                    "shard-scoped request is missing its shard",
                ));
            }
        }
    }

    let adapter = &env.adapter;
    let wire = |e: AdapterError| e.to_wire();

    match request.message_type {
        MessageType::Query | MessageType::ShardQuery => {
            let sql = required_sql(request)?;
            let params = request.params.clone().unwrap_or_default();
            let result = adapter
                .query(sql, &params, request.tx_id.as_deref())
                .await
                .map_err(wire)?;
            Ok(Envelope::result(&request.id, &result))
        }
        MessageType::Execute | MessageType::ShardExecute => {
            let sql = required_sql(request)?;
            let params = request.params.clone().unwrap_or_default();
            let result = adapter
                .execute(sql, &params, request.tx_id.as_deref())
                .await
                .map_err(wire)?;
            Ok(Envelope::result(&request.id, &result))
        }
        MessageType::Batch | MessageType::ShardBatch => {
            let statements = request.statements.clone().unwrap_or_default();
            let result = adapter
                .batch(&statements, request.tx_id.as_deref())
                .await
                .map_err(wire)?;
            Ok(Envelope::result(&request.id, &result))
        }
        MessageType::Begin => {
            let options = request.options.clone().unwrap_or_default();
            let tx_id = adapter.begin(options).await.map_err(wire)?;
            Ok(Envelope::result(
                &request.id,
                &BeginResponse {
                    tx_id,
                    shards: vec![env.shard.clone()],
                },
            ))
        }
        MessageType::Commit => {
            adapter
                .commit(required_tx(request)?)
                .await
                .map_err(wire)?;
            Ok(Envelope::ack(&request.id))
        }
        MessageType::Rollback => {
            adapter
                .rollback(required_tx(request)?)
                .await
                .map_err(wire)?;
            Ok(Envelope::ack(&request.id))
        }
        MessageType::Health => Ok(Envelope::ack(&request.id)),
        MessageType::Status => {
            let healthy = matches!(
                adapter.state(),
                crate::adapter::AdapterState::Ready
            );
            Ok(Envelope::result(
                &request.id,
                &ClusterStatus {
                    keyspaces: vec![env.keyspace.clone()],
                    shards: vec![ShardHealth {
                        shard: env.shard.clone(),
                        healthy,
                        message: None,
                    }],
                },
            ))
        }
        MessageType::Schema => {
            let result = adapter.schema().await.map_err(wire)?;
            Ok(Envelope::result(&request.id, &result))
        }
        other => Err(WireError::new(
            ErrorCode::QueryError,
            format!("message type {other:?} is not served by a tablet"),
        )),
    }
}

fn required_sql(request: &Envelope) -> Result<&str, WireError> {
    request
        .sql
        .as_deref()
        .ok_or_else(|| WireError::new(ErrorCode::QueryError, "request is missing sql"))
}

fn required_tx(request: &Envelope) -> Result<&str, WireError> {
    request
        .tx_id
        .as_deref()
        .ok_or_else(|| WireError::new(ErrorCode::TransactionError, "request is missing txId"))
}
