use crate::{App, errors::Error};
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

use protocol::message::{Envelope, MessageType};
use protocol::{ErrorCode, WireError};

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

pub fn app(env: App) -> Router {
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

/// Single protocol endpoint: every message arrives here and is dispatched
/// on its type. Errors become ERROR envelopes correlated to the request id;
/// the HTTP status stays 200 so the transport layer never retries
/// application failures.
#[instrument(skip(env, request), fields(message_type = ?request.message_type, id = %request.id))]
async fn rpc(Extension(env): Extension<App>, Json(request): Json<Envelope>) -> Response {
    let response = dispatch(&env, &request).await.unwrap_or_else(|e| {
        tracing::error!("request {} failed: {e}", request.id);
        Envelope::error(&request.id, e.to_wire())
    });
    Json(response).into_response()
}

async fn dispatch(env: &App, request: &Envelope) -> Result<Envelope> {
    let router = env.router();

    match request.message_type {
        MessageType::Query => {
            let sql = required_sql(request)?;
            let params = request.params.clone().unwrap_or_default();
            let result = router
                .query(sql, &params, request.tx_id.as_deref())
                .await?;
            Ok(Envelope::result(&request.id, &result))
        }
        MessageType::Execute => {
            let sql = required_sql(request)?;
            let params = request.params.clone().unwrap_or_default();
            let result = router
                .execute(sql, &params, request.tx_id.as_deref())
                .await?;
            Ok(Envelope::result(&request.id, &result))
        }
        MessageType::Batch => {
            let statements = request.statements.clone().unwrap_or_default();
            let mut results = Vec::with_capacity(statements.len());
            for statement in &statements {
                let params = statement.params.clone().unwrap_or_default();
                results.push(
                    router
                        .execute(&statement.sql, &params, request.tx_id.as_deref())
                        .await?,
                );
            }
            let duration_ms = results.iter().map(|r| r.duration_ms).sum();
            Ok(Envelope::result(
                &request.id,
                &protocol::message::BatchResult {
                    results,
                    duration_ms,
                },
            ))
        }
        MessageType::Begin => {
            let options = request.options.clone().unwrap_or_default();
            let begun = router
                .begin(request.keyspace.as_deref(), &options)
                .await?;
            Ok(Envelope::result(&request.id, &begun))
        }
        MessageType::Commit => {
            router.commit(required_tx(request)?).await?;
            Ok(Envelope::ack(&request.id))
        }
        MessageType::Rollback => {
            router.rollback(required_tx(request)?).await?;
            Ok(Envelope::ack(&request.id))
        }
        MessageType::Health => Ok(Envelope::ack(&request.id)),
        MessageType::Status => {
            let status = router.status().await;
            Ok(Envelope::result(&request.id, &status))
        }
        MessageType::VSchema => Ok(Envelope::result(&request.id, router.vschema().doc())),
        other => Err(Error::Wire(WireError::new(
            ErrorCode::QueryError,
            format!("message type {other:?} is not served by the gate"),
        ))),
    }
}

fn required_sql(request: &Envelope) -> Result<&str> {
    request
        .sql
        .as_deref()
        .ok_or_else(|| Error::Query("request is missing sql".to_string()))
}

fn required_tx(request: &Envelope) -> Result<&str> {
    request
        .tx_id
        .as_deref()
        .ok_or_else(|| Error::Transaction("request is missing txId".to_string()))
}
