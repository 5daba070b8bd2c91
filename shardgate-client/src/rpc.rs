use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use protocol::message::MessageType;
use protocol::{Envelope, WireError};
use tracing::{debug, warn};

/// HTTP statuses that justify another transport attempt.
const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the peer, e.g. `http://127.0.0.1:4000`.
    pub base_url: String,
    /// Transport attempts per request, including the first.
    pub max_attempts: u32,
    /// Base backoff; the wait between attempt `k` and `k+1` is `backoff_ms * k`.
    pub backoff_ms: u64,
    /// Bearer token attached to every request when set.
    pub bearer_token: Option<String>,
    /// Per-attempt deadline.
    pub request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_attempts: 3,
            backoff_ms: 100,
            bearer_token: None,
            request_timeout_ms: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("transport failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned HTTP {status} after {attempts} attempts")]
    Http { status: u16, attempts: u32 },

    /// Application-level ERROR message; never retried.
    #[error(transparent)]
    Application(#[from] WireError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("not connected")]
    NotConnected,
}

/// Typed request/response transport with linear-scaled retry backoff.
///
/// Retry counters are per-request; concurrent requests share nothing beyond
/// this configuration and the underlying connection pool.
pub struct RpcClient {
    http: reqwest::Client,
    config: ClientConfig,
    connected: AtomicBool,
}

impl RpcClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout_ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Protocol(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            config,
            connected: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue a HEALTH request and require an ACK before marking the
    /// connection usable.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let response = self.send(&Envelope::request(MessageType::Health)).await?;
        if response.message_type != MessageType::Ack {
            return Err(ClientError::Protocol(format!(
                "expected ACK to HEALTH, got {:?}",
                response.message_type
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Synchronous from the caller's view and idempotent.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Send one envelope and return the peer's reply.
    ///
    /// Transport faults and HTTP {500,502,503,504} are retried up to
    /// `max_attempts` with waits of `backoff_ms * k`; 4xx and application
    /// ERROR messages surface immediately.
    pub async fn send(&self, request: &Envelope) -> Result<Envelope, ClientError> {
        let url = format!("{}/rpc", self.config.base_url.trim_end_matches('/'));
        let mut attempt = 1u32;

        loop {
            match self.attempt(&url, request).await {
                Ok(response) => {
                    if let Some(error) = response.error {
                        return Err(ClientError::Application(error));
                    }
                    return Ok(response);
                }
                Err(failure) => {
                    let retryable = failure.retryable();
                    if !retryable || attempt >= self.config.max_attempts {
                        self.connected.store(false, Ordering::SeqCst);
                        return Err(failure.into_error(attempt));
                    }
                    let wait = Duration::from_millis(self.config.backoff_ms * attempt as u64);
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "retrying request {}",
                        request.id
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, url: &str, request: &Envelope) -> Result<Envelope, AttemptFailure> {
        let mut builder = self.http.post(url).json(request);
        if let Some(token) = &self.config.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(AttemptFailure::Network)?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(AttemptFailure::Status(status));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(AttemptFailure::MalformedBody)?;
        debug!(id = %envelope.id, "received {:?}", envelope.message_type);
        Ok(envelope)
    }
}

enum AttemptFailure {
    Network(reqwest::Error),
    Status(u16),
    MalformedBody(reqwest::Error),
}

impl AttemptFailure {
    fn retryable(&self) -> bool {
        match self {
            AttemptFailure::Network(_) => true,
            AttemptFailure::Status(status) => RETRYABLE_STATUSES.contains(status),
            AttemptFailure::MalformedBody(_) => false,
        }
    }

    fn into_error(self, attempts: u32) -> ClientError {
        match self {
            AttemptFailure::Network(source) | AttemptFailure::MalformedBody(source) => {
                ClientError::Transport { attempts, source }
            }
            AttemptFailure::Status(status) => ClientError::Http { status, attempts },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    use axum::{Extension, Json, Router, http::StatusCode, response::IntoResponse, routing::post};

    #[derive(Clone)]
    struct Flaky {
        hits: Arc<AtomicU32>,
        failures: u32,
    }

    async fn flaky_rpc(
        Extension(state): Extension<Flaky>,
        Json(request): Json<Envelope>,
    ) -> axum::response::Response {
        let hit = state.hits.fetch_add(1, Ordering::SeqCst);
        if hit < state.failures {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        } else {
            Json(Envelope::ack(&request.id)).into_response()
        }
    }

    async fn spawn_server(failures: u32) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let state = Flaky {
            hits: hits.clone(),
            failures,
        };
        let app = Router::new()
            .route("/rpc", post(flaky_rpc))
            .layer(Extension(state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    #[tokio::test]
    async fn connect_retries_through_503s() {
        let (base_url, hits) = spawn_server(2).await;
        let mut config = ClientConfig::new(base_url);
        config.max_attempts = 3;
        config.backoff_ms = 10;

        let client = RpcClient::new(config).unwrap();
        let started = Instant::now();
        client.connect().await.unwrap();

        // Three attempts total, with waits of 10ms and 20ms between them.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn retries_are_bounded_by_max_attempts() {
        let (base_url, hits) = spawn_server(10).await;
        let mut config = ClientConfig::new(base_url);
        config.max_attempts = 3;
        config.backoff_ms = 1;

        let client = RpcClient::new(config).unwrap();
        let err = client.connect().await.unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        match err {
            ClientError::Http { status, attempts } => {
                assert_eq!(status, 503);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn application_errors_are_not_retried() {
        use protocol::ErrorCode;

        async fn erroring_rpc(Json(request): Json<Envelope>) -> Json<Envelope> {
            Json(Envelope::error(
                &request.id,
                WireError::new(ErrorCode::UnsupportedSql, "nope"),
            ))
        }

        let app = Router::new().route("/rpc", post(erroring_rpc));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });

        let client = RpcClient::new(ClientConfig::new(format!("http://{addr}"))).unwrap();
        let err = client
            .send(&Envelope::request(MessageType::Query))
            .await
            .unwrap_err();
        match err {
            ClientError::Application(wire) => assert_eq!(wire.code, ErrorCode::UnsupportedSql),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let client = RpcClient::new(ClientConfig::new("http://127.0.0.1:1")).unwrap();
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }
}
