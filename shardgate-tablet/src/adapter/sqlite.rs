//! SQLite-compatible storage adapter over rusqlite.
//!
//! One engine connection; the async mutex around it is the single-writer
//! discipline. At most one top-level transaction is open at a time (that is
//! all one SQLite connection can hold); savepoints provide nesting inside
//! it. With `dialect = postgres`, every statement runs through the dialect
//! translator and the `$n` param rewriter first.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use protocol::message::{
    BatchResult, BatchStatement, Dialect, ExecuteResult, Field, QueryResult, TransactionMode,
    TransactionOptions,
};
use protocol::value::Row;
use protocol::{ErrorCode, SqlValue};

use crate::adapter::{
    AdapterError, AdapterEvent, AdapterState, Lifecycle, StorageAdapter, TxMeta, elapsed_ms, emit,
    event_channel, is_insert_statement,
};
use crate::params::{self, ParamInput};
use crate::translate;

/// Construction options, mirroring the wire config contract.
/// `auth_token`/`sync_url` belong to remote-replica deployments; they are
/// recorded but a local engine does not use them.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub url: String,
    pub auth_token: Option<String>,
    pub sync_url: Option<String>,
    pub dialect: Dialect,
}

impl SqliteOptions {
    pub fn in_memory() -> Self {
        Self {
            url: ":memory:".to_string(),
            auth_token: None,
            sync_url: None,
            dialect: Dialect::Sqlite,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

struct OpenTx {
    id: String,
    meta: TxMeta,
    savepoints: Vec<String>,
}

struct Engine {
    conn: Option<rusqlite::Connection>,
    tx: Option<OpenTx>,
}

impl Engine {
    fn conn(&self) -> Result<&rusqlite::Connection, AdapterError> {
        self.conn
            .as_ref()
            .ok_or_else(|| AdapterError::new(ErrorCode::AlreadyClosed, "engine released"))
    }
}

pub struct SqliteAdapter {
    options: SqliteOptions,
    lifecycle: Lifecycle,
    events: broadcast::Sender<AdapterEvent>,
    engine: Mutex<Engine>,
}

impl SqliteAdapter {
    pub fn new(options: SqliteOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            lifecycle: Lifecycle::new(),
            events: event_channel(),
            engine: Mutex::new(Engine {
                conn: None,
                tx: None,
            }),
        })
    }

    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    fn open_connection(&self) -> Result<rusqlite::Connection, AdapterError> {
        let url = self.options.url.as_str();
        let conn = if url == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("file:"))
                .unwrap_or(url);
            rusqlite::Connection::open(path)
        };
        conn.map_err(|e| {
            AdapterError::new(ErrorCode::ConnectionError, format!("cannot open engine: {e}"))
                .with_cause(e)
        })
    }

    /// Apply dialect translation and param rewriting as configured.
    fn prepare_statement(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<(String, Vec<SqlValue>), AdapterError> {
        match self.options.dialect {
            Dialect::Postgres => {
                let translated = translate::to_sqlite(sql);
                params::rewrite(&translated, ParamInput::Positional(params))
            }
            Dialect::Sqlite => Ok((sql.to_string(), params.to_vec())),
        }
    }

    /// Validate the caller's transaction id against the engine's open
    /// transaction, flipping it on timeout.
    fn check_tx(engine: &mut Engine, tx_id: Option<&str>, sql: &str) -> Result<(), AdapterError> {
        let Some(tx_id) = tx_id else {
            return Ok(());
        };
        let Some(open) = engine.tx.as_mut() else {
            return Err(AdapterError::new(
                ErrorCode::TransactionError,
                format!("unknown or finished transaction {tx_id}"),
            ));
        };
        if open.id != tx_id {
            return Err(AdapterError::new(
                ErrorCode::TransactionError,
                format!("unknown or finished transaction {tx_id}"),
            ));
        }
        if let Err(e) = open.meta.ensure_open() {
            // The engine-side transaction is dead weight now; roll it back
            // so the connection is usable again.
            if let Some(conn) = engine.conn.as_ref() {
                let _ = conn.execute_batch("ROLLBACK");
            }
            engine.tx = None;
            return Err(e);
        }
        open.meta.check_write(sql)?;
        Ok(())
    }

    fn run_query(
        conn: &rusqlite::Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<(Vec<Field>, Vec<Row>), AdapterError> {
        let mut prepared = conn.prepare(sql).map_err(classify)?;

        let fields: Vec<Field> = prepared
            .columns()
            .iter()
            .map(|col| {
                let (type_id, type_name) = map_decl_type(col.decl_type());
                Field {
                    name: col.name().to_string(),
                    type_id,
                    type_name: type_name.to_string(),
                }
            })
            .collect();
        let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();

        for (idx, value) in params.iter().enumerate() {
            prepared
                .raw_bind_parameter(idx + 1, bind_value(value))
                .map_err(classify)?;
        }

        let mut rows = Vec::new();
        let mut result = prepared.raw_query();
        while let Some(row) = result.next().map_err(classify)? {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = row.get_ref(i).map_err(classify)?;
                out.insert(name.clone(), decode_value(value));
            }
            rows.push(out);
        }

        Ok((fields, rows))
    }

    /// Create a savepoint inside the open transaction.
    pub async fn savepoint(&self, tx_id: &str, name: &str) -> Result<(), AdapterError> {
        self.savepoint_op(tx_id, name, SavepointOp::Create).await
    }

    pub async fn release_savepoint(&self, tx_id: &str, name: &str) -> Result<(), AdapterError> {
        self.savepoint_op(tx_id, name, SavepointOp::Release).await
    }

    pub async fn rollback_to_savepoint(&self, tx_id: &str, name: &str) -> Result<(), AdapterError> {
        self.savepoint_op(tx_id, name, SavepointOp::RollbackTo).await
    }

    async fn savepoint_op(
        &self,
        tx_id: &str,
        name: &str,
        op: SavepointOp,
    ) -> Result<(), AdapterError> {
        validate_savepoint_name(name)?;
        self.lifecycle.ensure_ready().await?;

        let mut engine = self.engine.lock().await;
        Self::check_tx(&mut engine, Some(tx_id), "SELECT 1")?;

        let sql = match op {
            SavepointOp::Create => format!("SAVEPOINT {name}"),
            SavepointOp::Release => format!("RELEASE SAVEPOINT {name}"),
            SavepointOp::RollbackTo => format!("ROLLBACK TO SAVEPOINT {name}"),
        };
        engine.conn()?.execute_batch(&sql).map_err(classify)?;

        let open = engine.tx.as_mut().expect("checked above");
        match op {
            SavepointOp::Create => open.savepoints.push(name.to_string()),
            SavepointOp::Release => {
                open.savepoints.retain(|s| s != name);
            }
            SavepointOp::RollbackTo => {}
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum SavepointOp {
    Create,
    Release,
    RollbackTo,
}

fn validate_savepoint_name(name: &str) -> Result<(), AdapterError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AdapterError::new(
            ErrorCode::QueryError,
            format!("invalid savepoint name {name:?}"),
        ));
    }
    Ok(())
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    #[instrument(skip(self), fields(url = %self.options.url))]
    async fn init(&self) -> Result<(), AdapterError> {
        if !self.lifecycle.claim_init().await? {
            return Ok(());
        }

        match self.open_connection() {
            Ok(conn) => {
                if self.options.sync_url.is_some() || self.options.auth_token.is_some() {
                    debug!("replica options recorded; local engine ignores them");
                }
                self.engine.lock().await.conn = Some(conn);
                self.lifecycle.set_ready();
                emit(&self.events, AdapterEvent::Ready);
                info!("sqlite engine ready");
                Ok(())
            }
            Err(e) => {
                self.lifecycle.set_failed(e.message.clone());
                emit(&self.events, AdapterEvent::Error(e.message.clone()));
                Err(e)
            }
        }
    }

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<QueryResult, AdapterError> {
        self.lifecycle.ensure_ready().await?;
        let started = Instant::now();
        let (sql, params) = self.prepare_statement(sql, params)?;

        let mut engine = self.engine.lock().await;
        Self::check_tx(&mut engine, tx_id, &sql)?;
        let (fields, rows) = Self::run_query(engine.conn()?, &sql, &params)?;

        Ok(QueryResult::with_rows(fields, rows, elapsed_ms(started)))
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<ExecuteResult, AdapterError> {
        self.lifecycle.ensure_ready().await?;
        let started = Instant::now();
        let (sql, params) = self.prepare_statement(sql, params)?;

        let mut engine = self.engine.lock().await;
        Self::check_tx(&mut engine, tx_id, &sql)?;
        let conn = engine.conn()?;

        let mut prepared = conn.prepare(&sql).map_err(classify)?;
        for (idx, value) in params.iter().enumerate() {
            prepared
                .raw_bind_parameter(idx + 1, bind_value(value))
                .map_err(classify)?;
        }
        let affected = prepared.raw_execute().map_err(classify)? as u64;

        let last_insert_id = if is_insert_statement(&sql) {
            match conn.last_insert_rowid() {
                0 => None,
                id => Some(id),
            }
        } else {
            None
        };

        Ok(ExecuteResult {
            affected,
            last_insert_id,
            duration_ms: elapsed_ms(started),
        })
    }

    async fn batch(
        &self,
        statements: &[BatchStatement],
        tx_id: Option<&str>,
    ) -> Result<BatchResult, AdapterError> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(statements.len());
        for (idx, statement) in statements.iter().enumerate() {
            let params = statement.params.clone().unwrap_or_default();
            let result = self
                .execute(&statement.sql, &params, tx_id)
                .await
                .map_err(|mut e| {
                    e.message = format!("batch statement {idx}: {}", e.message);
                    e
                })?;
            results.push(result);
        }
        Ok(BatchResult {
            results,
            duration_ms: elapsed_ms(started),
        })
    }

    async fn begin(&self, options: TransactionOptions) -> Result<String, AdapterError> {
        self.lifecycle.ensure_ready().await?;

        let mut engine = self.engine.lock().await;
        if engine.tx.is_some() {
            return Err(AdapterError::new(
                ErrorCode::TransactionError,
                "a transaction is already in progress on this engine",
            ));
        }

        let mode = match options.mode.unwrap_or_default() {
            TransactionMode::Deferred => "DEFERRED",
            TransactionMode::Immediate => "IMMEDIATE",
            TransactionMode::Exclusive => "EXCLUSIVE",
        };
        engine
            .conn()?
            .execute_batch(&format!("BEGIN {mode}"))
            .map_err(classify)?;

        let id = Uuid::new_v4().to_string();
        engine.tx = Some(OpenTx {
            id: id.clone(),
            meta: TxMeta::new(options),
            savepoints: Vec::new(),
        });
        emit(&self.events, AdapterEvent::TransactionBegin(id.clone()));
        Ok(id)
    }

    async fn commit(&self, tx_id: &str) -> Result<(), AdapterError> {
        self.lifecycle.ensure_ready().await?;

        let mut engine = self.engine.lock().await;
        Self::check_tx(&mut engine, Some(tx_id), "SELECT 1")?;
        engine.conn()?.execute_batch("COMMIT").map_err(classify)?;
        engine.tx = None;
        emit(&self.events, AdapterEvent::TransactionCommit(tx_id.to_string()));
        Ok(())
    }

    async fn rollback(&self, tx_id: &str) -> Result<(), AdapterError> {
        self.lifecycle.ensure_ready().await?;

        let mut engine = self.engine.lock().await;
        Self::check_tx(&mut engine, Some(tx_id), "SELECT 1")?;
        engine.conn()?.execute_batch("ROLLBACK").map_err(classify)?;
        engine.tx = None;
        emit(
            &self.events,
            AdapterEvent::TransactionRollback(tx_id.to_string()),
        );
        Ok(())
    }

    async fn schema(&self) -> Result<QueryResult, AdapterError> {
        self.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            &[],
            None,
        )
        .await
    }

    async fn close(&self) -> Result<(), AdapterError> {
        let mut engine = self.engine.lock().await;
        if let Some(open) = engine.tx.take() {
            warn!("closing with open transaction {}; rolling back", open.id);
            if let Some(conn) = engine.conn.as_ref() {
                let _ = conn.execute_batch("ROLLBACK");
            }
            emit(&self.events, AdapterEvent::TransactionRollback(open.id));
        }
        engine.conn = None;
        if self.lifecycle.set_closed() {
            emit(&self.events, AdapterEvent::Closed);
        }
        Ok(())
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }
}

fn bind_value(value: &SqlValue) -> rusqlite::types::Value {
    use rusqlite::types::Value as V;
    match value {
        SqlValue::Null => V::Null,
        SqlValue::Bool(b) => V::Integer(*b as i64),
        SqlValue::Int(n) => V::Integer(*n),
        SqlValue::Float(x) => V::Real(*x),
        SqlValue::Numeric(s) => V::Text(s.clone()),
        SqlValue::Text(s) => V::Text(s.clone()),
        SqlValue::Bytes(b) => V::Blob(b.clone()),
        SqlValue::Json(v) => V::Text(v.to_string()),
        SqlValue::Array(values) => V::Text(
            serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string()),
        ),
    }
}

fn decode_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(n) => SqlValue::Int(n),
        ValueRef::Real(x) => SqlValue::Float(x),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Bytes(bytes.to_vec()),
    }
}

/// SQLite's fundamental storage classes stand in for engine type ids.
fn map_decl_type(decl: Option<&str>) -> (i32, &'static str) {
    let Some(decl) = decl else {
        return (0, "unknown");
    };
    let upper = decl.to_ascii_uppercase();
    if upper.contains("INT") {
        (1, "integer")
    } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
        (3, "text")
    } else if upper.contains("BLOB") {
        (4, "bytes")
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        (2, "double")
    } else if upper.contains("NUMERIC") || upper.contains("DECIMAL") {
        (2, "numeric")
    } else {
        (0, "unknown")
    }
}

fn classify(e: rusqlite::Error) -> AdapterError {
    use rusqlite::ffi;

    let (code, text) = match &e {
        rusqlite::Error::SqliteFailure(ffi_error, message) => {
            let text = message
                .clone()
                .unwrap_or_else(|| ffi_error.to_string());
            let code = match ffi_error.code {
                rusqlite::ErrorCode::ConstraintViolation => match ffi_error.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        ErrorCode::UniqueViolation
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ErrorCode::ForeignKeyViolation,
                    ffi::SQLITE_CONSTRAINT_NOTNULL => ErrorCode::NotNullViolation,
                    _ => ErrorCode::ConstraintViolation,
                },
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    ErrorCode::DeadlockDetected
                }
                _ if text.contains("syntax error") => ErrorCode::SyntaxError,
                _ if text.contains("no such table") => ErrorCode::TableNotFound,
                _ => ErrorCode::QueryError,
            };
            (code, text)
        }
        other => {
            let text = other.to_string();
            let code = if text.contains("syntax error") {
                ErrorCode::SyntaxError
            } else if text.contains("no such table") {
                ErrorCode::TableNotFound
            } else {
                ErrorCode::QueryError
            };
            (code, text)
        }
    };
    AdapterError::new(code, text).with_cause(e)
}
