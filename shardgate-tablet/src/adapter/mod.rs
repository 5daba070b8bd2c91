//! The uniform storage contract over both engine backends.
//!
//! Both adapters share one lifecycle state machine
//! (`created → initializing → ready → closed`), one error shape, one
//! transaction discipline and one event stream; only the engine underneath
//! differs.

pub mod postgres;
pub mod sqlite;

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use protocol::message::{
    BatchResult, BatchStatement, ExecuteResult, QueryResult, TransactionOptions,
};
use protocol::{ErrorCode, SqlValue, WireError};

pub use postgres::{PostgresAdapter, PostgresOptions};
pub use sqlite::{SqliteAdapter, SqliteOptions};

/// Error raised by a storage adapter: classification code, human message,
/// optional SQLSTATE, optional engine-level cause.
#[derive(thiserror::Error, Debug)]
#[error("{code}: {message}")]
pub struct AdapterError {
    pub code: ErrorCode,
    pub message: String,
    pub sql_state: Option<String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AdapterError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sql_state: None,
            cause: None,
        }
    }

    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn to_wire(&self) -> WireError {
        let mut wire = WireError::new(self.code, self.message.clone());
        if let Some(state) = &self.sql_state {
            wire = wire.with_sql_state(state.clone());
        }
        wire
    }

    fn already_closed() -> Self {
        Self::new(ErrorCode::AlreadyClosed, "adapter is closed")
    }

    fn not_ready() -> Self {
        Self::new(ErrorCode::NotReady, "adapter is not initialized")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Created,
    Initializing,
    Ready,
    Closed,
}

#[derive(Clone, Debug)]
enum Phase {
    Created,
    Initializing,
    Ready,
    Closed,
    /// Init failed; the adapter is back to square one but waiters need the
    /// failure message.
    Failed(String),
}

/// Lifecycle machine shared by both adapters. Built on a watch channel so
/// any number of waiters can park on a phase change.
pub(crate) struct Lifecycle {
    tx: watch::Sender<Phase>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Created);
        Self { tx }
    }

    pub(crate) fn state(&self) -> AdapterState {
        match &*self.tx.borrow() {
            Phase::Created | Phase::Failed(_) => AdapterState::Created,
            Phase::Initializing => AdapterState::Initializing,
            Phase::Ready => AdapterState::Ready,
            Phase::Closed => AdapterState::Closed,
        }
    }

    /// Returns `Ok(true)` when the caller should perform initialization,
    /// `Ok(false)` when the adapter is already ready. Callers arriving
    /// while another init is in flight wait here; an init failure
    /// propagates to all of them as CONNECTION_ERROR.
    pub(crate) async fn claim_init(&self) -> Result<bool, AdapterError> {
        let mut rx = self.tx.subscribe();
        loop {
            let phase = rx.borrow_and_update().clone();
            match phase {
                Phase::Ready => return Ok(false),
                Phase::Closed => return Err(AdapterError::already_closed()),
                Phase::Created | Phase::Failed(_) => {
                    let mut claimed = false;
                    self.tx.send_if_modified(|p| {
                        if matches!(p, Phase::Created | Phase::Failed(_)) {
                            *p = Phase::Initializing;
                            claimed = true;
                            true
                        } else {
                            false
                        }
                    });
                    if claimed {
                        return Ok(true);
                    }
                }
                Phase::Initializing => {
                    rx.changed().await.map_err(|_| AdapterError::already_closed())?;
                    if let Phase::Failed(message) = &*rx.borrow() {
                        return Err(AdapterError::new(
                            ErrorCode::ConnectionError,
                            message.clone(),
                        ));
                    }
                }
            }
        }
    }

    /// Gate for regular operations: ready passes, an in-flight init is
    /// awaited, anything else is a terminal answer.
    pub(crate) async fn ensure_ready(&self) -> Result<(), AdapterError> {
        let mut rx = self.tx.subscribe();
        loop {
            let phase = rx.borrow_and_update().clone();
            match phase {
                Phase::Ready => return Ok(()),
                Phase::Closed => return Err(AdapterError::already_closed()),
                Phase::Created | Phase::Failed(_) => return Err(AdapterError::not_ready()),
                Phase::Initializing => {
                    rx.changed().await.map_err(|_| AdapterError::already_closed())?;
                }
            }
        }
    }

    pub(crate) fn set_ready(&self) {
        let _ = self.tx.send(Phase::Ready);
    }

    pub(crate) fn set_failed(&self, message: impl Into<String>) {
        let _ = self.tx.send(Phase::Failed(message.into()));
    }

    /// Returns whether this call performed the transition (false when the
    /// adapter was already closed — close is idempotent).
    pub(crate) fn set_closed(&self) -> bool {
        let mut transitioned = false;
        self.tx.send_if_modified(|p| {
            if matches!(p, Phase::Closed) {
                false
            } else {
                *p = Phase::Closed;
                transitioned = true;
                true
            }
        });
        transitioned
    }
}

/// Adapter lifecycle and transaction notifications, fanned out to any
/// number of independent subscribers. Handlers must not block the adapter:
/// the channel is bounded and lagging receivers drop messages rather than
/// exerting backpressure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Ready,
    Error(String),
    TransactionBegin(String),
    TransactionCommit(String),
    TransactionRollback(String),
    Closed,
}

pub(crate) fn event_channel() -> broadcast::Sender<AdapterEvent> {
    broadcast::channel(64).0
}

pub(crate) fn emit(events: &broadcast::Sender<AdapterEvent>, event: AdapterEvent) {
    // No subscribers is fine.
    let _ = events.send(event);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
    TimedOut,
}

/// Book-keeping for one live transaction.
#[derive(Debug)]
pub(crate) struct TxMeta {
    pub(crate) options: TransactionOptions,
    pub(crate) state: TxState,
    pub(crate) deadline: Option<Instant>,
}

impl TxMeta {
    pub(crate) fn new(options: TransactionOptions) -> Self {
        let deadline = options
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        Self {
            options,
            state: TxState::Open,
            deadline,
        }
    }

    /// Check the transaction is usable; a passed deadline flips it to
    /// `TimedOut` irrevocably.
    pub(crate) fn ensure_open(&mut self) -> Result<(), AdapterError> {
        match self.state {
            TxState::Open => {
                if self.deadline.is_some_and(|d| Instant::now() >= d) {
                    self.state = TxState::TimedOut;
                    return Err(AdapterError::new(
                        ErrorCode::TransactionError,
                        "transaction timed out",
                    ));
                }
                Ok(())
            }
            TxState::Committed => Err(AdapterError::new(
                ErrorCode::TransactionError,
                "transaction already committed",
            )),
            TxState::RolledBack => Err(AdapterError::new(
                ErrorCode::TransactionError,
                "transaction already rolled back",
            )),
            TxState::TimedOut => Err(AdapterError::new(
                ErrorCode::TransactionError,
                "transaction timed out",
            )),
        }
    }

    /// Read-only transactions refuse writes before anything reaches the
    /// engine.
    pub(crate) fn check_write(&self, sql: &str) -> Result<(), AdapterError> {
        if self.options.read_only && is_write_statement(sql) {
            return Err(AdapterError::new(
                ErrorCode::TransactionError,
                "write attempted in a read-only transaction",
            ));
        }
        Ok(())
    }
}

/// First meaningful keyword of a statement, past comments and whitespace.
pub(crate) fn leading_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped
                .split_once('\n')
                .map(|(_, tail)| tail)
                .unwrap_or("")
                .trim_start();
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped
                .split_once("*/")
                .map(|(_, tail)| tail)
                .unwrap_or("")
                .trim_start();
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

pub(crate) fn is_write_statement(sql: &str) -> bool {
    matches!(
        leading_keyword(sql).as_str(),
        "INSERT" | "UPDATE" | "DELETE" | "CREATE" | "DROP" | "ALTER" | "TRUNCATE" | "REPLACE"
    )
}

pub(crate) fn is_insert_statement(sql: &str) -> bool {
    leading_keyword(sql) == "INSERT"
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// The uniform query/execute/transaction contract both backends satisfy.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Idempotent; concurrent callers all resolve once the engine is up.
    async fn init(&self) -> Result<(), AdapterError>;

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<QueryResult, AdapterError>;

    async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<ExecuteResult, AdapterError>;

    /// Sequential execution; the first failure aborts the rest.
    async fn batch(
        &self,
        statements: &[BatchStatement],
        tx_id: Option<&str>,
    ) -> Result<BatchResult, AdapterError>;

    async fn begin(&self, options: TransactionOptions) -> Result<String, AdapterError>;
    async fn commit(&self, tx_id: &str) -> Result<(), AdapterError>;
    async fn rollback(&self, tx_id: &str) -> Result<(), AdapterError>;

    /// List the engine's tables.
    async fn schema(&self) -> Result<QueryResult, AdapterError>;

    /// Rolls back open transactions, releases the engine; idempotent.
    async fn close(&self) -> Result<(), AdapterError>;

    fn state(&self) -> AdapterState;
    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent>;
}

/// Handle passed to `run_transaction` callbacks. It carries the adapter
/// identity as a weak reference only: the adapter remains the authoritative
/// terminator, and a handle outliving its adapter fails with
/// ALREADY_CLOSED instead of keeping the engine alive.
#[derive(Clone)]
pub struct Transaction {
    adapter: Weak<dyn StorageAdapter>,
    id: String,
    scoped: bool,
}

impl Transaction {
    pub fn new(adapter: &Arc<dyn StorageAdapter>, id: impl Into<String>, scoped: bool) -> Self {
        Self {
            adapter: Arc::downgrade(adapter),
            id: id.into(),
            scoped,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn adapter(&self) -> Result<Arc<dyn StorageAdapter>, AdapterError> {
        self.adapter.upgrade().ok_or_else(AdapterError::already_closed)
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, AdapterError> {
        self.adapter()?.query(sql, params, Some(&self.id)).await
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ExecuteResult, AdapterError> {
        self.adapter()?.execute(sql, params, Some(&self.id)).await
    }

    pub async fn commit(&self) -> Result<(), AdapterError> {
        if self.scoped {
            return Err(AdapterError::new(
                ErrorCode::TransactionError,
                "manual commit inside a scoped transaction",
            ));
        }
        self.adapter()?.commit(&self.id).await
    }

    pub async fn rollback(&self) -> Result<(), AdapterError> {
        if self.scoped {
            return Err(AdapterError::new(
                ErrorCode::TransactionError,
                "manual rollback inside a scoped transaction",
            ));
        }
        self.adapter()?.rollback(&self.id).await
    }
}

/// Scoped transaction: commit on callback success, rollback on failure,
/// release guaranteed either way.
pub async fn run_transaction<T, F, Fut>(
    adapter: Arc<dyn StorageAdapter>,
    options: TransactionOptions,
    cb: F,
) -> Result<T, AdapterError>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let id = adapter.begin(options).await?;
    let handle = Transaction::new(&adapter, id.clone(), true);

    match cb(handle).await {
        Ok(value) => {
            adapter.commit(&id).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = adapter.rollback(&id).await {
                debug!("rollback after failed transaction callback: {rollback_err}");
            }
            Err(e)
        }
    }
}
