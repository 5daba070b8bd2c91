//! Postgres-compatible storage adapter over a sqlx connection pool.
//!
//! The pool is the engine handle. The engine contract is single-writer, so
//! every operation funnels through the adapter's engine mutex; the pool's
//! own concurrency is not exposed. Live transactions are sqlx transactions
//! parked in a registry keyed by id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::mac_address::MacAddress;
use sqlx::postgres::types::{PgInterval, PgMoney, PgTimeTz};
use sqlx::{Column, Row as _, TypeInfo};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use protocol::message::{
    BatchResult, BatchStatement, ExecuteResult, Field, IsolationLevel, QueryResult,
    TransactionOptions,
};
use protocol::value::Row;
use protocol::{ErrorCode, SqlValue};

use crate::adapter::{
    AdapterError, AdapterEvent, AdapterState, Lifecycle, StorageAdapter, TxMeta, TxState,
    elapsed_ms, emit, event_channel, is_insert_statement,
};

/// Construction options. `data_dir` is accepted for embedded-engine
/// deployments and recorded; a pooled engine reaches its server via `url`.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub url: String,
    pub data_dir: Option<PathBuf>,
    pub debug: bool,
    pub init_schema: Option<String>,
    pub max_connections: u32,
}

impl PostgresOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            data_dir: None,
            debug: false,
            init_schema: None,
            max_connections: 5,
        }
    }
}

struct PgTx {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
    meta: TxMeta,
}

struct Engine {
    pool: PgPool,
    txs: HashMap<String, PgTx>,
}

pub struct PostgresAdapter {
    options: PostgresOptions,
    lifecycle: Lifecycle,
    events: broadcast::Sender<AdapterEvent>,
    engine: Mutex<Option<Engine>>,
}

impl PostgresAdapter {
    pub fn new(options: PostgresOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            lifecycle: Lifecycle::new(),
            events: event_channel(),
            engine: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &PostgresOptions {
        &self.options
    }

    /// Validate a transaction and clean up one that just hit its deadline.
    /// Returns an error for anything but an open, in-date transaction.
    async fn check_tx(
        engine: &mut Engine,
        tx_id: &str,
        sql: &str,
    ) -> Result<(), AdapterError> {
        let outcome = {
            let Some(ptx) = engine.txs.get_mut(tx_id) else {
                return Err(AdapterError::new(
                    ErrorCode::TransactionError,
                    format!("unknown or finished transaction {tx_id}"),
                ));
            };
            match ptx.meta.ensure_open() {
                Ok(()) => {
                    ptx.meta.check_write(sql)?;
                    None
                }
                Err(e) => Some((e, ptx.meta.state == TxState::TimedOut)),
            }
        };

        if let Some((e, timed_out)) = outcome {
            if timed_out {
                if let Some(dead) = engine.txs.remove(tx_id) {
                    let _ = dead.tx.rollback().await;
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for PostgresAdapter {
    #[instrument(skip(self))]
    async fn init(&self) -> Result<(), AdapterError> {
        if !self.lifecycle.claim_init().await? {
            return Ok(());
        }

        if let Some(data_dir) = &self.options.data_dir {
            debug!("embedded data dir recorded: {}", data_dir.display());
        }

        let connected = PgPoolOptions::new()
            .max_connections(self.options.max_connections)
            .connect(&self.options.url)
            .await;

        let pool = match connected {
            Ok(pool) => pool,
            Err(e) => {
                let error = AdapterError::new(
                    ErrorCode::ConnectionError,
                    format!("cannot reach engine: {e}"),
                )
                .with_cause(e);
                self.lifecycle.set_failed(error.message.clone());
                emit(&self.events, AdapterEvent::Error(error.message.clone()));
                return Err(error);
            }
        };

        if let Some(schema) = &self.options.init_schema {
            if let Err(e) = sqlx::raw_sql(schema).execute(&pool).await {
                let error = classify(e);
                self.lifecycle.set_failed(error.message.clone());
                emit(&self.events, AdapterEvent::Error(error.message.clone()));
                return Err(error);
            }
        }

        *self.engine.lock().await = Some(Engine {
            pool,
            txs: HashMap::new(),
        });
        self.lifecycle.set_ready();
        emit(&self.events, AdapterEvent::Ready);
        info!("postgres engine ready");
        Ok(())
    }

    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<QueryResult, AdapterError> {
        self.lifecycle.ensure_ready().await?;
        let started = Instant::now();

        let mut guard = self.engine.lock().await;
        let engine = guard
            .as_mut()
            .ok_or_else(|| AdapterError::new(ErrorCode::AlreadyClosed, "engine released"))?;

        let rows = match tx_id {
            Some(id) => {
                Self::check_tx(engine, id, sql).await?;
                let ptx = engine.txs.get_mut(id).expect("validated above");
                fetch_rows(&mut *ptx.tx, sql, params).await?
            }
            None => fetch_rows(&engine.pool, sql, params).await?,
        };

        let fields = rows
            .first()
            .map(|(fields, _)| fields.clone())
            .unwrap_or_default();
        let decoded: Vec<Row> = rows.into_iter().map(|(_, row)| row).collect();
        Ok(QueryResult::with_rows(fields, decoded, elapsed_ms(started)))
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<ExecuteResult, AdapterError> {
        self.lifecycle.ensure_ready().await?;
        let started = Instant::now();
        let want_insert_id = is_insert_statement(sql);

        let mut guard = self.engine.lock().await;
        let engine = guard
            .as_mut()
            .ok_or_else(|| AdapterError::new(ErrorCode::AlreadyClosed, "engine released"))?;

        let (affected, last_insert_id) = match tx_id {
            Some(id) => {
                Self::check_tx(engine, id, sql).await?;
                let ptx = engine.txs.get_mut(id).expect("validated above");
                let affected = run_execute(&mut *ptx.tx, sql, params).await?;
                let last = if want_insert_id {
                    fetch_lastval(&mut *ptx.tx).await
                } else {
                    None
                };
                (affected, last)
            }
            None => {
                let affected = run_execute(&engine.pool, sql, params).await?;
                let last = if want_insert_id {
                    fetch_lastval(&engine.pool).await
                } else {
                    None
                };
                (affected, last)
            }
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

        let mut guard = self.engine.lock().await;
        let engine = guard
            .as_mut()
            .ok_or_else(|| AdapterError::new(ErrorCode::AlreadyClosed, "engine released"))?;

        let mut tx = engine.pool.begin().await.map_err(classify)?;

        if let Some(isolation) = options.isolation {
            // read_uncommitted is accepted for wire compatibility; the
            // engine silently promotes it to read committed.
            let level = match isolation {
                IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
                IsolationLevel::ReadCommitted => "READ COMMITTED",
                IsolationLevel::RepeatableRead => "REPEATABLE READ",
                IsolationLevel::Serializable => "SERIALIZABLE",
            };
            sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {level}"))
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }
        if options.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }

        let id = Uuid::new_v4().to_string();
        engine.txs.insert(
            id.clone(),
            PgTx {
                tx,
                meta: TxMeta::new(options),
            },
        );
        emit(&self.events, AdapterEvent::TransactionBegin(id.clone()));
        Ok(id)
    }

    async fn commit(&self, tx_id: &str) -> Result<(), AdapterError> {
        self.lifecycle.ensure_ready().await?;

        let mut guard = self.engine.lock().await;
        let engine = guard
            .as_mut()
            .ok_or_else(|| AdapterError::new(ErrorCode::AlreadyClosed, "engine released"))?;

        let mut ptx = engine.txs.remove(tx_id).ok_or_else(|| {
            AdapterError::new(
                ErrorCode::TransactionError,
                format!("unknown or finished transaction {tx_id}"),
            )
        })?;
        if let Err(e) = ptx.meta.ensure_open() {
            let _ = ptx.tx.rollback().await;
            return Err(e);
        }

        ptx.tx.commit().await.map_err(classify)?;
        emit(&self.events, AdapterEvent::TransactionCommit(tx_id.to_string()));
        Ok(())
    }

    async fn rollback(&self, tx_id: &str) -> Result<(), AdapterError> {
        self.lifecycle.ensure_ready().await?;

        let mut guard = self.engine.lock().await;
        let engine = guard
            .as_mut()
            .ok_or_else(|| AdapterError::new(ErrorCode::AlreadyClosed, "engine released"))?;

        let mut ptx = engine.txs.remove(tx_id).ok_or_else(|| {
            AdapterError::new(
                ErrorCode::TransactionError,
                format!("unknown or finished transaction {tx_id}"),
            )
        })?;
        if let Err(e) = ptx.meta.ensure_open() {
            let _ = ptx.tx.rollback().await;
            return Err(e);
        }

        ptx.tx.rollback().await.map_err(classify)?;
        emit(
            &self.events,
            AdapterEvent::TransactionRollback(tx_id.to_string()),
        );
        Ok(())
    }

    async fn schema(&self) -> Result<QueryResult, AdapterError> {
        self.query(
            "SELECT tablename AS name FROM pg_tables WHERE schemaname = 'public' \
             ORDER BY tablename",
            &[],
            None,
        )
        .await
    }

    async fn close(&self) -> Result<(), AdapterError> {
        let mut guard = self.engine.lock().await;
        if let Some(mut engine) = guard.take() {
            for (id, ptx) in engine.txs.drain() {
                warn!("closing with open transaction {id}; rolling back");
                let _ = ptx.tx.rollback().await;
                emit(&self.events, AdapterEvent::TransactionRollback(id));
            }
            engine.pool.close().await;
        }
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

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

async fn fetch_rows<'c, E>(
    executor: E,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<(Vec<Field>, Row)>, AdapterError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let mut query = sqlx::query(sql);
    for value in params {
        query = bind_value(query, value)?;
    }
    let rows = query.fetch_all(executor).await.map_err(classify)?;
    rows.iter().map(decode_row).collect()
}

async fn run_execute<'c, E>(
    executor: E,
    sql: &str,
    params: &[SqlValue],
) -> Result<u64, AdapterError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let mut query = sqlx::query(sql);
    for value in params {
        query = bind_value(query, value)?;
    }
    let done = query.execute(executor).await.map_err(classify)?;
    Ok(done.rows_affected())
}

/// Best-effort `lastval()`; absence of a sequence is not an error.
async fn fetch_lastval<'c, E>(executor: E) -> Option<i64>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query_scalar::<_, i64>("SELECT lastval()")
        .fetch_one(executor)
        .await
        .ok()
}

fn bind_value<'q>(query: PgQuery<'q>, value: &SqlValue) -> Result<PgQuery<'q>, AdapterError> {
    Ok(match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(n) => query.bind(*n),
        SqlValue::Float(x) => query.bind(*x),
        SqlValue::Numeric(s) => {
            let decimal = BigDecimal::from_str(s).map_err(|_| {
                AdapterError::new(
                    ErrorCode::TypeError,
                    format!("{s:?} is not a valid numeric value"),
                )
            })?;
            query.bind(decimal)
        }
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Json(v) => query.bind(v.clone()),
        SqlValue::Array(values) => match homogeneous_array(values)? {
            ArrayBind::Int(items) => query.bind(items),
            ArrayBind::Float(items) => query.bind(items),
            ArrayBind::Text(items) => query.bind(items),
            ArrayBind::Bool(items) => query.bind(items),
        },
    })
}

enum ArrayBind {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    Bool(Vec<bool>),
}

/// Array params must be homogeneous to pick an engine array type. Mixed
/// int/float widens to float.
fn homogeneous_array(values: &[SqlValue]) -> Result<ArrayBind, AdapterError> {
    if values.iter().all(|v| matches!(v, SqlValue::Int(_))) {
        return Ok(ArrayBind::Int(
            values.iter().filter_map(SqlValue::as_i64).collect(),
        ));
    }
    if values
        .iter()
        .all(|v| matches!(v, SqlValue::Int(_) | SqlValue::Float(_)))
    {
        return Ok(ArrayBind::Float(
            values.iter().filter_map(SqlValue::as_f64).collect(),
        ));
    }
    if values.iter().all(|v| matches!(v, SqlValue::Text(_))) {
        return Ok(ArrayBind::Text(
            values
                .iter()
                .map(|v| v.to_string())
                .collect(),
        ));
    }
    if values.iter().all(|v| matches!(v, SqlValue::Bool(_))) {
        return Ok(ArrayBind::Bool(
            values
                .iter()
                .map(|v| matches!(v, SqlValue::Bool(true)))
                .collect(),
        ));
    }
    Err(AdapterError::new(
        ErrorCode::TypeError,
        "array parameters must be homogeneous",
    ))
}

fn decode_row(row: &PgRow) -> Result<(Vec<Field>, Row), AdapterError> {
    let mut fields = Vec::with_capacity(row.columns().len());
    let mut out = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_string();
        fields.push(Field {
            name: column.name().to_string(),
            type_id: type_oid(&type_name),
            type_name: portable_type_name(&type_name).to_string(),
        });
        out.insert(column.name().to_string(), decode_column(row, i, &type_name)?);
    }

    Ok((fields, out))
}

fn decode_column(row: &PgRow, i: usize, type_name: &str) -> Result<SqlValue, AdapterError> {
    fn get<'r, T>(row: &'r PgRow, i: usize) -> Result<Option<T>, AdapterError>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(i).map_err(|e| {
            AdapterError::new(ErrorCode::TypeError, format!("column decode failed: {e}"))
        })
    }

    macro_rules! decode {
        ($ty:ty, $map:expr) => {
            Ok(get::<$ty>(row, i)?.map($map).unwrap_or(SqlValue::Null))
        };
    }

    match type_name {
        "BOOL" => decode!(bool, SqlValue::Bool),
        "INT2" => decode!(i16, |n| SqlValue::Int(n as i64)),
        "INT4" => decode!(i32, |n| SqlValue::Int(n as i64)),
        "INT8" => decode!(i64, SqlValue::Int),
        "FLOAT4" => decode!(f32, |x| SqlValue::Float(x as f64)),
        "FLOAT8" => decode!(f64, SqlValue::Float),
        "NUMERIC" => decode!(BigDecimal, |d| SqlValue::Numeric(d.to_string())),
        "MONEY" => decode!(PgMoney, |m| SqlValue::Numeric(format_money(m.0))),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => decode!(String, SqlValue::Text),
        "DATE" => decode!(NaiveDate, |d| SqlValue::Text(d.format("%Y-%m-%d").to_string())),
        "TIME" => decode!(NaiveTime, |t| SqlValue::Text(t.format("%H:%M:%S%.f").to_string())),
        "TIMETZ" => decode!(PgTimeTz<NaiveTime, FixedOffset>, |t| {
            SqlValue::Text(format_timetz(t))
        }),
        "TIMESTAMP" => decode!(NaiveDateTime, |t| {
            SqlValue::Text(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        "TIMESTAMPTZ" => decode!(DateTime<Utc>, |t| SqlValue::Text(t.to_rfc3339())),
        "INTERVAL" => decode!(PgInterval, |iv| SqlValue::Text(format_interval(&iv))),
        "BYTEA" => decode!(Vec<u8>, SqlValue::Bytes),
        "JSON" | "JSONB" => decode!(serde_json::Value, SqlValue::Json),
        "UUID" => decode!(sqlx::types::Uuid, |u| SqlValue::Text(u.to_string())),
        "INET" | "CIDR" => decode!(IpNetwork, |n| SqlValue::Text(n.to_string())),
        "MACADDR" => decode!(MacAddress, |m| SqlValue::Text(m.to_string())),
        name if name.ends_with("[]") => decode_array(row, i, &name[..name.len() - 2]),
        _ => {
            // Unknown engine type: text first, bytes second, null last.
            if let Ok(value) = row.try_get::<Option<String>, _>(i) {
                return Ok(value.map(SqlValue::Text).unwrap_or(SqlValue::Null));
            }
            if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(i) {
                return Ok(value.map(SqlValue::Bytes).unwrap_or(SqlValue::Null));
            }
            warn!("cannot decode engine type {type_name}; returning NULL");
            Ok(SqlValue::Null)
        }
    }
}

fn decode_array(row: &PgRow, i: usize, element: &str) -> Result<SqlValue, AdapterError> {
    macro_rules! decode_vec {
        ($ty:ty, $map:expr) => {
            row.try_get::<Option<Vec<$ty>>, _>(i)
                .map(|opt| {
                    opt.map(|items| {
                        SqlValue::Array(items.into_iter().map($map).collect())
                    })
                    .unwrap_or(SqlValue::Null)
                })
                .map_err(|e| {
                    AdapterError::new(ErrorCode::TypeError, format!("array decode failed: {e}"))
                })
        };
    }

    match element {
        "INT2" => decode_vec!(i16, |n| SqlValue::Int(n as i64)),
        "INT4" => decode_vec!(i32, |n| SqlValue::Int(n as i64)),
        "INT8" => decode_vec!(i64, SqlValue::Int),
        "FLOAT4" => decode_vec!(f32, |x| SqlValue::Float(x as f64)),
        "FLOAT8" => decode_vec!(f64, SqlValue::Float),
        "TEXT" | "VARCHAR" => decode_vec!(String, SqlValue::Text),
        "BOOL" => decode_vec!(bool, SqlValue::Bool),
        "NUMERIC" => decode_vec!(BigDecimal, |d| SqlValue::Numeric(d.to_string())),
        "UUID" => decode_vec!(sqlx::types::Uuid, |u| SqlValue::Text(u.to_string())),
        other => Err(AdapterError::new(
            ErrorCode::TypeError,
            format!("unsupported array element type {other}"),
        )),
    }
}

fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}{}.{:02}", (cents / 100).abs(), (cents % 100).abs())
}

fn format_timetz(t: PgTimeTz<NaiveTime, FixedOffset>) -> String {
    // Normalize to UTC.
    let offset_seconds = t.offset.local_minus_utc() as i64;
    let utc = t.time - chrono::Duration::seconds(offset_seconds);
    format!("{}+00", utc.format("%H:%M:%S%.f"))
}

fn format_interval(interval: &PgInterval) -> String {
    format!(
        "{} mons {} days {} us",
        interval.months, interval.days, interval.microseconds
    )
}

/// Well-known engine type OIDs, reported as the engine-native type id.
fn type_oid(type_name: &str) -> i32 {
    match type_name {
        "BOOL" => 16,
        "BYTEA" => 17,
        "INT8" => 20,
        "INT2" => 21,
        "INT4" => 23,
        "TEXT" => 25,
        "JSON" => 114,
        "FLOAT4" => 700,
        "FLOAT8" => 701,
        "MONEY" => 790,
        "MACADDR" => 829,
        "INET" => 869,
        "CIDR" => 650,
        "BPCHAR" | "CHAR" => 1042,
        "VARCHAR" => 1043,
        "DATE" => 1082,
        "TIME" => 1083,
        "TIMESTAMP" => 1114,
        "TIMESTAMPTZ" => 1184,
        "INTERVAL" => 1186,
        "TIMETZ" => 1266,
        "NUMERIC" => 1700,
        "UUID" => 2950,
        "JSONB" => 3802,
        _ => 0,
    }
}

fn portable_type_name(type_name: &str) -> &'static str {
    match type_name {
        "BOOL" => "boolean",
        "INT2" | "INT4" | "INT8" => "integer",
        "FLOAT4" | "FLOAT8" => "double",
        "NUMERIC" | "MONEY" => "numeric",
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => "text",
        "DATE" => "date",
        "TIME" | "TIMETZ" => "time",
        "TIMESTAMP" | "TIMESTAMPTZ" => "timestamp",
        "INTERVAL" => "interval",
        "BYTEA" => "bytes",
        "JSON" | "JSONB" => "json",
        "UUID" => "uuid",
        "INET" | "CIDR" | "MACADDR" => "network",
        name if name.ends_with("[]") => "array",
        _ => "unknown",
    }
}

fn classify_sqlstate(state: &str) -> ErrorCode {
    match state {
        "23505" => ErrorCode::UniqueViolation,
        "23503" => ErrorCode::ForeignKeyViolation,
        "23502" => ErrorCode::NotNullViolation,
        s if s.starts_with("23") => ErrorCode::ConstraintViolation,
        "42601" => ErrorCode::SyntaxError,
        "42P01" => ErrorCode::TableNotFound,
        s if s.starts_with("42") => ErrorCode::QueryError,
        s if s.starts_with("22") => ErrorCode::TypeError,
        "40001" | "40P01" => ErrorCode::DeadlockDetected,
        "57014" => ErrorCode::Timeout,
        _ => ErrorCode::QueryError,
    }
}

/// Fallback when the engine reports no SQLSTATE.
fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_ascii_lowercase();
    if lower.contains("duplicate key") {
        ErrorCode::UniqueViolation
    } else if lower.contains("violates foreign key") {
        ErrorCode::ForeignKeyViolation
    } else if lower.contains("null value") && lower.contains("not-null") {
        ErrorCode::NotNullViolation
    } else if lower.contains("syntax error") {
        ErrorCode::SyntaxError
    } else if lower.contains("deadlock") {
        ErrorCode::DeadlockDetected
    } else {
        ErrorCode::QueryError
    }
}

fn classify(e: sqlx::Error) -> AdapterError {
    let (code, message, sql_state) = match &e {
        sqlx::Error::Database(db) => {
            let state = db.code().map(|c| c.to_string());
            let code = state
                .as_deref()
                .map(classify_sqlstate)
                .unwrap_or_else(|| classify_message(db.message()));
            (code, db.message().to_string(), state)
        }
        sqlx::Error::Io(io) => (ErrorCode::ConnectionError, io.to_string(), None),
        sqlx::Error::PoolTimedOut => (
            ErrorCode::ConnectionError,
            "engine pool timed out".to_string(),
            None,
        ),
        sqlx::Error::PoolClosed => (
            ErrorCode::AlreadyClosed,
            "engine pool is closed".to_string(),
            None,
        ),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            (ErrorCode::TypeError, e.to_string(), None)
        }
        other => (ErrorCode::QueryError, other.to_string(), None),
    };

    let mut error = AdapterError::new(code, message).with_cause(e);
    if let Some(state) = sql_state {
        error = error.with_sql_state(state);
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_prefixes_classify() {
        assert_eq!(classify_sqlstate("23505"), ErrorCode::UniqueViolation);
        assert_eq!(classify_sqlstate("23503"), ErrorCode::ForeignKeyViolation);
        assert_eq!(classify_sqlstate("23502"), ErrorCode::NotNullViolation);
        assert_eq!(classify_sqlstate("23514"), ErrorCode::ConstraintViolation);
        assert_eq!(classify_sqlstate("42601"), ErrorCode::SyntaxError);
        assert_eq!(classify_sqlstate("42P01"), ErrorCode::TableNotFound);
        assert_eq!(classify_sqlstate("42703"), ErrorCode::QueryError);
        assert_eq!(classify_sqlstate("22003"), ErrorCode::TypeError);
        assert_eq!(classify_sqlstate("40P01"), ErrorCode::DeadlockDetected);
        assert_eq!(classify_sqlstate("XX000"), ErrorCode::QueryError);
    }

    #[test]
    fn message_heuristics_cover_missing_sqlstate() {
        assert_eq!(
            classify_message("duplicate key value violates unique constraint"),
            ErrorCode::UniqueViolation
        );
        assert_eq!(
            classify_message("ERROR: syntax error at or near \"FROMM\""),
            ErrorCode::SyntaxError
        );
        assert_eq!(classify_message("something exploded"), ErrorCode::QueryError);
    }

    #[test]
    fn money_formats_losslessly() {
        assert_eq!(format_money(123456), "1234.56");
        assert_eq!(format_money(-50), "-0.50");
        assert_eq!(format_money(5), "0.05");
        assert_eq!(format_money(0), "0.00");
    }

    #[test]
    fn interval_format_is_stable() {
        let interval = PgInterval {
            months: 2,
            days: 3,
            microseconds: 4_000_000,
        };
        assert_eq!(format_interval(&interval), "2 mons 3 days 4000000 us");
    }

    #[test]
    fn oids_match_the_engine_catalog() {
        assert_eq!(type_oid("BOOL"), 16);
        assert_eq!(type_oid("INT8"), 20);
        assert_eq!(type_oid("NUMERIC"), 1700);
        assert_eq!(type_oid("JSONB"), 3802);
        assert_eq!(type_oid("MADE_UP"), 0);
    }

    #[test]
    fn array_params_must_be_homogeneous() {
        assert!(matches!(
            homogeneous_array(&[SqlValue::Int(1), SqlValue::Int(2)]),
            Ok(ArrayBind::Int(_))
        ));
        assert!(matches!(
            homogeneous_array(&[SqlValue::Int(1), SqlValue::Float(2.5)]),
            Ok(ArrayBind::Float(_))
        ));
        assert!(matches!(
            homogeneous_array(&[SqlValue::Text("a".into())]),
            Ok(ArrayBind::Text(_))
        ));
        assert!(homogeneous_array(&[SqlValue::Int(1), SqlValue::Text("x".into())]).is_err());
    }

    #[test]
    fn portable_names_follow_the_mapping_table() {
        assert_eq!(portable_type_name("INT2"), "integer");
        assert_eq!(portable_type_name("BPCHAR"), "text");
        assert_eq!(portable_type_name("TIMESTAMPTZ"), "timestamp");
        assert_eq!(portable_type_name("INT4[]"), "array");
    }
}
