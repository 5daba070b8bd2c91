//! The router executes query plans against tablet stubs.
//!
//! Fan-out is parallel and unordered; the first shard failure cancels its
//! siblings cooperatively (the join drops their futures) and surfaces
//! wrapped with shard context. Result aggregation is deterministic only
//! under ORDER BY.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use protocol::message::{
    BeginResponse, ClusterStatus, Envelope, ExecuteResult, MessageType, QueryResult, ShardHealth,
    TransactionOptions,
};
use protocol::{ErrorCode, SqlValue, WireError};
use shardgate_client::RpcClient;

use crate::aggregate;
use crate::errors::Error;
use crate::planner::{self, PlanKind, QueryPlan};
use crate::shard::route_to_shard;
use crate::vindex::{LookupStore, Vindex};
use crate::vschema::VSchema;

/// One shard-local executor as seen by the router. Implemented remotely
/// over the RPC protocol and by in-process fakes in tests.
#[async_trait]
pub trait Tablet: Send + Sync {
    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<QueryResult, WireError>;

    async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<ExecuteResult, WireError>;

    async fn begin(&self, options: &TransactionOptions) -> Result<String, WireError>;
    async fn commit(&self, tx_id: &str) -> Result<(), WireError>;
    async fn rollback(&self, tx_id: &str) -> Result<(), WireError>;
    async fn health(&self) -> Result<(), WireError>;
}

/// Tablet stub speaking SHARD_* messages to a tablet server.
pub struct RemoteTablet {
    shard: String,
    rpc: RpcClient,
}

impl RemoteTablet {
    pub fn new(shard: impl Into<String>, rpc: RpcClient) -> Self {
        Self {
            shard: shard.into(),
            rpc,
        }
    }

    fn to_wire(error: shardgate_client::ClientError) -> WireError {
        match error {
            shardgate_client::ClientError::Application(wire) => wire,
            other => WireError::new(ErrorCode::ConnectionError, other.to_string()),
        }
    }
}

#[async_trait]
impl Tablet for RemoteTablet {
    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<QueryResult, WireError> {
        let mut request = Envelope::request(MessageType::ShardQuery)
            .with_sql(sql, params.to_vec())
            .with_shard(&self.shard);
        request.tx_id = tx_id.map(str::to_string);
        let response = self.rpc.send(&request).await.map_err(Self::to_wire)?;
        response.decode_result()
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<ExecuteResult, WireError> {
        let mut request = Envelope::request(MessageType::ShardExecute)
            .with_sql(sql, params.to_vec())
            .with_shard(&self.shard);
        request.tx_id = tx_id.map(str::to_string);
        let response = self.rpc.send(&request).await.map_err(Self::to_wire)?;
        response.decode_result()
    }

    async fn begin(&self, options: &TransactionOptions) -> Result<String, WireError> {
        let mut request = Envelope::request(MessageType::Begin).with_shard(&self.shard);
        request.options = Some(options.clone());
        let response = self.rpc.send(&request).await.map_err(Self::to_wire)?;
        let begun: BeginResponse = response.decode_result()?;
        Ok(begun.tx_id)
    }

    async fn commit(&self, tx_id: &str) -> Result<(), WireError> {
        let request = Envelope::request(MessageType::Commit).with_tx(tx_id);
        self.rpc.send(&request).await.map_err(Self::to_wire)?;
        Ok(())
    }

    async fn rollback(&self, tx_id: &str) -> Result<(), WireError> {
        let request = Envelope::request(MessageType::Rollback).with_tx(tx_id);
        self.rpc.send(&request).await.map_err(Self::to_wire)?;
        Ok(())
    }

    async fn health(&self) -> Result<(), WireError> {
        let request = Envelope::request(MessageType::Health);
        self.rpc.send(&request).await.map_err(Self::to_wire)?;
        Ok(())
    }
}

/// Gate-level transaction: one engine transaction per shard of the target
/// keyspace, no two-phase commit.
struct GateTx {
    keyspace: String,
    /// shard name → tablet transaction id.
    shard_txs: HashMap<String, String>,
}

/// The VTGate: owns the VSchema, the tablet stubs, a read-mostly vindex
/// cache, and the lookup store.
pub struct Router {
    vschema: VSchema,
    tablets: HashMap<String, HashMap<String, Arc<dyn Tablet>>>,
    vindex_cache: RwLock<HashMap<(String, String), Arc<Vindex>>>,
    lookup_store: Arc<dyn LookupStore>,
    transactions: Mutex<HashMap<String, GateTx>>,
}

impl Router {
    pub fn new(vschema: VSchema, lookup_store: Arc<dyn LookupStore>) -> Self {
        Self {
            vschema,
            tablets: HashMap::new(),
            vindex_cache: RwLock::new(HashMap::new()),
            lookup_store,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_tablet(
        &mut self,
        keyspace: impl Into<String>,
        shard: impl Into<String>,
        tablet: Arc<dyn Tablet>,
    ) {
        self.tablets
            .entry(keyspace.into())
            .or_default()
            .insert(shard.into(), tablet);
    }

    pub fn vschema(&self) -> &VSchema {
        &self.vschema
    }

    /// Swap in a new VSchema. Excludes cache readers for the duration of
    /// the write, per the config-reload contract.
    pub fn reload_vschema(&mut self, vschema: VSchema) {
        let mut cache = self.vindex_cache.write().expect("vindex cache poisoned");
        cache.clear();
        drop(cache);
        self.vschema = vschema;
    }

    fn cached_vindex(&self, keyspace: &str, name: &str) -> Option<Arc<Vindex>> {
        let key = (keyspace.to_string(), name.to_string());
        if let Some(hit) = self
            .vindex_cache
            .read()
            .expect("vindex cache poisoned")
            .get(&key)
        {
            return Some(hit.clone());
        }

        let vindex = self.vschema.keyspace(keyspace)?.vindex(name)?.clone();
        self.vindex_cache
            .write()
            .expect("vindex cache poisoned")
            .insert(key, vindex.clone());
        Some(vindex)
    }

    fn tablet(&self, keyspace: &str, shard: &str) -> Result<Arc<dyn Tablet>, Error> {
        self.tablets
            .get(keyspace)
            .and_then(|shards| shards.get(shard))
            .cloned()
            .ok_or_else(|| {
                Error::ShardUnavailable(format!("no tablet registered for {keyspace}/{shard}"))
            })
    }

    pub fn plan(&self, sql: &str, params: &[SqlValue]) -> Result<QueryPlan, Error> {
        planner::plan(&self.vschema, sql, params)
    }

    /// Plan and execute a read.
    #[instrument(skip(self, params))]
    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<QueryResult, Error> {
        let plan = self.plan(sql, params)?;
        debug!(kind = ?plan.kind, shards = plan.shards.len(), "executing plan");

        let targets = self.resolve_targets(&plan).await?;
        let shard_txs = self.shard_txs_for(&plan, tx_id).await?;

        if matches!(plan.kind, PlanKind::SingleShard | PlanKind::Unsharded) {
            let shard = &targets[0];
            let tablet = self.tablet(&plan.keyspace, shard)?;
            let tx = shard_txs.as_ref().and_then(|m| m.get(shard)).cloned();
            return tablet
                .query(&plan.sql, &plan.params, tx.as_deref())
                .await
                .map_err(|e| Error::shard(shard.clone(), Error::Wire(e)));
        }

        if targets.is_empty() {
            return Ok(QueryResult::default());
        }

        let results = self
            .fan_out_query(&plan, &targets, shard_txs.as_ref())
            .await?;

        Ok(match plan.kind {
            PlanKind::ScatterAggregate => aggregate::merge_aggregate(&plan.aggregates, &results)?,
            _ if !plan.order_by.is_empty() => {
                aggregate::merge_ordered(&plan.order_by, results, plan.limit, plan.offset)
            }
            _ => aggregate::concat(results, plan.limit, plan.offset),
        })
    }

    /// Plan and execute a write.
    #[instrument(skip(self, params))]
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        tx_id: Option<&str>,
    ) -> Result<ExecuteResult, Error> {
        let plan = self.plan(sql, params)?;
        let targets = self.resolve_targets(&plan).await?;
        let shard_txs = self.shard_txs_for(&plan, tx_id).await?;

        if matches!(plan.kind, PlanKind::SingleShard | PlanKind::Unsharded) {
            let shard = &targets[0];
            let tablet = self.tablet(&plan.keyspace, shard)?;
            let tx = shard_txs.as_ref().and_then(|m| m.get(shard)).cloned();
            return tablet
                .execute(&plan.sql, &plan.params, tx.as_deref())
                .await
                .map_err(|e| Error::shard(shard.clone(), Error::Wire(e)));
        }

        if targets.is_empty() {
            return Ok(ExecuteResult::default());
        }

        let tablets = self.gather_tablets(&plan.keyspace, &targets)?;
        let results = try_join_all(tablets.into_iter().map(|(shard, tablet)| {
            let sql = plan.sql.clone();
            let params = plan.params.clone();
            let tx = shard_txs.as_ref().and_then(|m| m.get(&shard)).cloned();
            async move {
                tablet
                    .execute(&sql, &params, tx.as_deref())
                    .await
                    .map_err(|e| Error::shard(shard, Error::Wire(e)))
            }
        }))
        .await?;

        let affected = results.iter().map(|r| r.affected).sum();
        let duration_ms = results.iter().map(|r| r.duration_ms).max().unwrap_or(0);
        Ok(ExecuteResult {
            affected,
            // Only a single-shard insert has a meaningful insert id.
            last_insert_id: None,
            duration_ms,
        })
    }

    /// The shards a plan actually targets; lookup plans resolve through the
    /// lookup store here, shrinking the full set to the owning shards.
    async fn resolve_targets(&self, plan: &QueryPlan) -> Result<Vec<String>, Error> {
        let Some(lookup) = &plan.lookup else {
            return Ok(plan.shards.clone());
        };

        let vindex = self
            .cached_vindex(&plan.keyspace, &lookup.vindex)
            .ok_or_else(|| {
                Error::InvalidVSchema(format!("lookup vindex {} not found", lookup.vindex))
            })?;
        let lookup_vindex = vindex.as_lookup().ok_or_else(|| {
            Error::InvalidVSchema(format!("vindex {} is not a lookup vindex", lookup.vindex))
        })?;

        let resolved = lookup_vindex
            .lookup(
                &lookup.vindex,
                std::slice::from_ref(&lookup.value),
                self.lookup_store.as_ref(),
            )
            .await?;

        let keyspace = self
            .vschema
            .keyspace(&plan.keyspace)
            .ok_or(Error::NoKeyspace)?;

        // Keep shard-list order, drop duplicates.
        let mut targets = Vec::new();
        for id in resolved.into_iter().flatten() {
            let shard = route_to_shard(id, &keyspace.shards)?.name().to_string();
            if !targets.contains(&shard) {
                targets.push(shard);
            }
        }
        targets.sort_by_key(|name| plan.shards.iter().position(|s| s == name));
        Ok(targets)
    }

    async fn fan_out_query(
        &self,
        plan: &QueryPlan,
        targets: &[String],
        shard_txs: Option<&HashMap<String, String>>,
    ) -> Result<Vec<QueryResult>, Error> {
        let tablets = self.gather_tablets(&plan.keyspace, targets)?;
        try_join_all(tablets.into_iter().map(|(shard, tablet)| {
            let sql = plan.sql.clone();
            let params = plan.params.clone();
            let tx = shard_txs.and_then(|m| m.get(&shard)).cloned();
            async move {
                tablet
                    .query(&sql, &params, tx.as_deref())
                    .await
                    .map_err(|e| Error::shard(shard, Error::Wire(e)))
            }
        }))
        .await
    }

    fn gather_tablets(
        &self,
        keyspace: &str,
        shards: &[String],
    ) -> Result<Vec<(String, Arc<dyn Tablet>)>, Error> {
        shards
            .iter()
            .map(|shard| Ok((shard.clone(), self.tablet(keyspace, shard)?)))
            .collect()
    }

    /// Per-shard tablet transaction ids for a statement inside a gate
    /// transaction. Statements naming another keyspace fail here.
    async fn shard_txs_for(
        &self,
        plan: &QueryPlan,
        tx_id: Option<&str>,
    ) -> Result<Option<HashMap<String, String>>, Error> {
        let Some(tx_id) = tx_id else {
            return Ok(None);
        };
        let transactions = self.transactions.lock().await;
        let tx = transactions
            .get(tx_id)
            .ok_or_else(|| Error::Transaction(format!("unknown transaction {tx_id}")))?;
        if tx.keyspace != plan.keyspace {
            return Err(Error::Transaction(format!(
                "transaction {tx_id} is bound to keyspace {}, statement targets {}",
                tx.keyspace, plan.keyspace
            )));
        }
        Ok(Some(tx.shard_txs.clone()))
    }

    /// BEGIN: start one engine transaction on every shard of the keyspace.
    pub async fn begin(
        &self,
        keyspace: Option<&str>,
        options: &TransactionOptions,
    ) -> Result<BeginResponse, Error> {
        let keyspace = self.vschema.resolve_keyspace(keyspace, None)?;
        let shards = keyspace.shard_names();

        let mut shard_txs = HashMap::new();
        for shard in &shards {
            let tablet = self.tablet(&keyspace.name, shard)?;
            match tablet.begin(options).await {
                Ok(tablet_tx) => {
                    shard_txs.insert(shard.clone(), tablet_tx);
                }
                Err(e) => {
                    // Best-effort rollback of the shards already begun.
                    for (begun_shard, begun_tx) in &shard_txs {
                        let tablet = self.tablet(&keyspace.name, begun_shard)?;
                        if let Err(rollback_err) = tablet.rollback(begun_tx).await {
                            warn!(shard = %begun_shard, "rollback after failed begin: {rollback_err}");
                        }
                    }
                    return Err(Error::shard(shard.clone(), Error::Wire(e)));
                }
            }
        }

        let tx_id = Uuid::new_v4().to_string();
        self.transactions.lock().await.insert(
            tx_id.clone(),
            GateTx {
                keyspace: keyspace.name.clone(),
                shard_txs,
            },
        );

        Ok(BeginResponse { tx_id, shards })
    }

    pub async fn commit(&self, tx_id: &str) -> Result<(), Error> {
        self.finish(tx_id, true).await
    }

    pub async fn rollback(&self, tx_id: &str) -> Result<(), Error> {
        self.finish(tx_id, false).await
    }

    /// Walk every enlisted shard, attempting all of them; the first failure
    /// is reported after the walk. No two-phase commit.
    async fn finish(&self, tx_id: &str, commit: bool) -> Result<(), Error> {
        let tx = self
            .transactions
            .lock()
            .await
            .remove(tx_id)
            .ok_or_else(|| Error::Transaction(format!("unknown transaction {tx_id}")))?;

        let mut first_failure = None;
        let mut shards: Vec<_> = tx.shard_txs.iter().collect();
        shards.sort();
        for (shard, tablet_tx) in shards {
            let tablet = self.tablet(&tx.keyspace, shard)?;
            let outcome = if commit {
                tablet.commit(tablet_tx).await
            } else {
                tablet.rollback(tablet_tx).await
            };
            if let Err(e) = outcome {
                warn!(shard = %shard, commit, "transaction finish failed: {e}");
                first_failure.get_or_insert(Error::shard(shard.clone(), Error::Wire(e)));
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Per-shard health across every keyspace, gathered in parallel.
    pub async fn health(&self) -> Vec<ShardHealth> {
        let mut probes = Vec::new();
        for (keyspace, shards) in &self.tablets {
            for (shard, tablet) in shards {
                let label = format!("{keyspace}/{shard}");
                let tablet = tablet.clone();
                probes.push(async move {
                    match tablet.health().await {
                        Ok(()) => ShardHealth {
                            shard: label,
                            healthy: true,
                            message: None,
                        },
                        Err(e) => ShardHealth {
                            shard: label,
                            healthy: false,
                            message: Some(e.to_string()),
                        },
                    }
                });
            }
        }
        let mut healths = join_all(probes).await;
        healths.sort_by(|a, b| a.shard.cmp(&b.shard));
        healths
    }

    pub async fn status(&self) -> ClusterStatus {
        ClusterStatus {
            keyspaces: self.vschema.keyspace_names(),
            shards: self.health().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::vindex::MemoryLookupStore;
    use crate::vschema::VSchema;
    use protocol::Row;

    fn sharded_vschema() -> VSchema {
        VSchema::from_json(
            r#"{
                "keyspaces": {
                    "commerce": {
                        "sharded": true,
                        "shards": ["-80", "80-"],
                        "vindexes": {
                            "user_hash": { "type": "hash" },
                            "name_lookup": { "type": "lookup" }
                        },
                        "tables": {
                            "users": {
                                "column_vindexes": [
                                    { "column": "id", "name": "user_hash" },
                                    { "column": "name", "name": "name_lookup" }
                                ]
                            }
                        }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    /// Canned tablet: returns fixed rows and counts its calls.
    struct FakeTablet {
        rows: Vec<Row>,
        calls: AtomicU32,
        fail_with: Option<WireError>,
    }

    impl FakeTablet {
        fn with_rows(rows: Vec<Vec<(&str, SqlValue)>>) -> Arc<Self> {
            Arc::new(Self {
                rows: rows
                    .into_iter()
                    .map(|cols| {
                        cols.into_iter()
                            .map(|(n, v)| (n.to_string(), v))
                            .collect()
                    })
                    .collect(),
                calls: AtomicU32::new(0),
                fail_with: None,
            })
        }

        fn failing(error: WireError) -> Arc<Self> {
            Arc::new(Self {
                rows: vec![],
                calls: AtomicU32::new(0),
                fail_with: Some(error),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tablet for FakeTablet {
        async fn query(
            &self,
            _sql: &str,
            _params: &[SqlValue],
            _tx_id: Option<&str>,
        ) -> Result<QueryResult, WireError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
            Ok(QueryResult::with_rows(vec![], self.rows.clone(), 1))
        }

        async fn execute(
            &self,
            _sql: &str,
            _params: &[SqlValue],
            _tx_id: Option<&str>,
        ) -> Result<ExecuteResult, WireError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
            Ok(ExecuteResult {
                affected: 1,
                last_insert_id: None,
                duration_ms: 1,
            })
        }

        async fn begin(&self, _options: &TransactionOptions) -> Result<String, WireError> {
            Ok(format!("tx-{}", self.calls.fetch_add(1, Ordering::SeqCst)))
        }

        async fn commit(&self, _tx_id: &str) -> Result<(), WireError> {
            Ok(())
        }

        async fn rollback(&self, _tx_id: &str) -> Result<(), WireError> {
            Ok(())
        }

        async fn health(&self) -> Result<(), WireError> {
            Ok(())
        }
    }

    fn router_with(
        left: Arc<FakeTablet>,
        right: Arc<FakeTablet>,
    ) -> Router {
        let mut router = Router::new(sharded_vschema(), Arc::new(MemoryLookupStore::new()));
        router.register_tablet("commerce", "-80", left);
        router.register_tablet("commerce", "80-", right);
        router
    }

    #[tokio::test]
    async fn point_read_touches_exactly_one_tablet() {
        let left = FakeTablet::with_rows(vec![vec![("id", SqlValue::Int(42))]]);
        let right = FakeTablet::with_rows(vec![vec![("id", SqlValue::Int(42))]]);
        let router = router_with(left.clone(), right.clone());

        router
            .query("SELECT * FROM users WHERE id = $1", &[SqlValue::Int(42)], None)
            .await
            .unwrap();

        assert_eq!(left.calls() + right.calls(), 1);
    }

    #[tokio::test]
    async fn scatter_aggregate_combines_counts() {
        let left = FakeTablet::with_rows(vec![vec![("count", SqlValue::Int(10))]]);
        let right = FakeTablet::with_rows(vec![vec![("count", SqlValue::Int(7))]]);
        let router = router_with(left.clone(), right.clone());

        let result = router
            .query("SELECT COUNT(*) FROM users", &[], None)
            .await
            .unwrap();

        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0].get("count"), Some(&SqlValue::Int(17)));
        assert_eq!(left.calls(), 1);
        assert_eq!(right.calls(), 1);
    }

    #[tokio::test]
    async fn ordered_merge_with_limit_across_shards() {
        let left = FakeTablet::with_rows(vec![
            vec![("age", SqlValue::Int(50))],
            vec![("age", SqlValue::Int(30))],
        ]);
        let right = FakeTablet::with_rows(vec![
            vec![("age", SqlValue::Int(45))],
            vec![("age", SqlValue::Int(20))],
            vec![("age", SqlValue::Int(10))],
        ]);
        let router = router_with(left, right);

        let result = router
            .query(
                "SELECT id, age FROM users ORDER BY age DESC LIMIT 3",
                &[],
                None,
            )
            .await
            .unwrap();

        let ages: Vec<i64> = result
            .rows
            .iter()
            .map(|r| r.get("age").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ages, vec![50, 45, 30]);
    }

    #[tokio::test]
    async fn shard_failures_carry_shard_context() {
        let left = FakeTablet::with_rows(vec![]);
        let right = FakeTablet::failing(WireError::new(ErrorCode::QueryError, "disk on fire"));
        let router = router_with(left, right);

        let err = router
            .query("SELECT * FROM users", &[], None)
            .await
            .unwrap_err();

        let wire = err.to_wire();
        assert_eq!(wire.shard.as_deref(), Some("80-"));
        assert_eq!(wire.code, ErrorCode::QueryError);
    }

    #[tokio::test]
    async fn lookup_plan_resolves_then_routes() {
        let vschema = sharded_vschema();
        let store = Arc::new(MemoryLookupStore::new());
        // Map "alice" to an id owned by shard 80-.
        store
            .put(
                "name_lookup",
                &SqlValue::Text("alice".into()),
                crate::shard::KeyspaceId(u64::MAX),
            )
            .await
            .unwrap();

        let left = FakeTablet::with_rows(vec![]);
        let right = FakeTablet::with_rows(vec![vec![("name", SqlValue::Text("alice".into()))]]);
        let mut router = Router::new(vschema, store);
        router.register_tablet("commerce", "-80", left.clone());
        router.register_tablet("commerce", "80-", right.clone());

        let result = router
            .query(
                "SELECT * FROM users WHERE name = $1",
                &[SqlValue::Text("alice".into())],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.row_count, 1);
        assert_eq!(left.calls(), 0);
        assert_eq!(right.calls(), 1);
    }

    #[tokio::test]
    async fn unresolved_lookup_returns_empty() {
        let left = FakeTablet::with_rows(vec![]);
        let right = FakeTablet::with_rows(vec![]);
        let router = router_with(left.clone(), right.clone());

        let result = router
            .query(
                "SELECT * FROM users WHERE name = $1",
                &[SqlValue::Text("nobody".into())],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.row_count, 0);
        assert_eq!(left.calls() + right.calls(), 0);
    }

    #[tokio::test]
    async fn begin_enlists_every_shard() {
        let left = FakeTablet::with_rows(vec![]);
        let right = FakeTablet::with_rows(vec![]);
        let router = router_with(left, right);

        let begun = router
            .begin(Some("commerce"), &TransactionOptions::default())
            .await
            .unwrap();
        assert_eq!(begun.shards, vec!["-80", "80-"]);

        router.commit(&begun.tx_id).await.unwrap();
        // The transaction is gone afterwards.
        let err = router.commit(&begun.tx_id).await.unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
    }

    #[tokio::test]
    async fn scatter_execute_sums_affected_rows() {
        let left = FakeTablet::with_rows(vec![]);
        let right = FakeTablet::with_rows(vec![]);
        let router = router_with(left, right);

        let result = router
            .execute("UPDATE users SET active = $1", &[SqlValue::Bool(false)], None)
            .await
            .unwrap();
        assert_eq!(result.affected, 2);
    }
}
