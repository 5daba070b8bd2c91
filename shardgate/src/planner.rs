//! The planner turns a parsed statement plus the VSchema into a QueryPlan.
//!
//! Routing rules apply in a fixed order, first match wins; planning is pure
//! given the same VSchema and statement, so plans are cacheable and
//! testable without tablets.

use protocol::SqlValue;
use serde::Serialize;

use crate::errors::Error;
use crate::parser::{self, Aggregate, SortDirection, Statement, StatementKind};
use crate::shard::route_to_shard;
use crate::vschema::{Keyspace, VSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    SingleShard,
    Scatter,
    ScatterAggregate,
    Lookup,
    Unsharded,
}

/// Lookup plans carry the vindex to consult and the value to resolve; the
/// shard list stays the full set until resolution.
#[derive(Debug, Clone, Serialize)]
pub struct LookupSpec {
    pub vindex: String,
    pub value: SqlValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
    pub kind: PlanKind,
    pub keyspace: String,
    pub table: Option<String>,
    /// Target shard names, in keyspace shard-list order.
    pub shards: Vec<String>,
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub aggregates: Vec<Aggregate>,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lookup: Option<LookupSpec>,
}

/// Produce a plan for `(sql, params)` against `vschema`.
pub fn plan(vschema: &VSchema, sql: &str, params: &[SqlValue]) -> Result<QueryPlan, Error> {
    let stmt = parser::parse(sql);

    // Rule 1: resolve the target keyspace.
    let keyspace = vschema.resolve_keyspace(stmt.keyspace.as_deref(), stmt.table.as_deref())?;

    // Rule 2: case-insensitive table lookup, normalized to the VSchema
    // spelling when declared there.
    let table = stmt
        .table
        .as_deref()
        .map(|t| {
            keyspace
                .find_table(t)
                .map(|declared| declared.name.clone())
                .unwrap_or_else(|| t.to_string())
        });

    // Rule 3: only statements the parser understands are routable.
    if stmt.kind == StatementKind::Other {
        return Err(Error::UnsupportedSql(truncate(sql)));
    }

    let base = |kind: PlanKind, shards: Vec<String>| QueryPlan {
        kind,
        keyspace: keyspace.name.clone(),
        table: table.clone(),
        shards,
        sql: sql.to_string(),
        params: params.to_vec(),
        aggregates: stmt.aggregates.clone(),
        order_by: stmt.order_by.clone(),
        limit: stmt.limit,
        offset: stmt.offset,
        lookup: None,
    };

    // Rule 4: unsharded keyspaces have exactly one target.
    if !keyspace.sharded {
        return Ok(base(PlanKind::Unsharded, keyspace.shard_names()));
    }

    // Rule 5: no table means nothing to bind a vindex to.
    let Some(table_name) = &table else {
        return Ok(base(scatter_kind(&stmt), keyspace.shard_names()));
    };

    // Rule 6: resolve the primary vindex; tables unknown to the VSchema
    // scatter.
    let Some(declared) = keyspace.find_table(table_name) else {
        return Ok(base(scatter_kind(&stmt), keyspace.shard_names()));
    };
    let Some(primary) = declared.primary() else {
        return Ok(base(scatter_kind(&stmt), keyspace.shard_names()));
    };

    // Rule 7: an equality on a column bound to a secondary lookup vindex
    // plans a lookup; the shard list stays full until it resolves.
    if let Some((column, bound)) = &stmt.where_equality {
        if let Some(binding) = declared.binding_for_column(column) {
            let is_primary = binding.vindex == primary.vindex
                && binding.column().eq_ignore_ascii_case(primary.column());
            if !is_primary {
                if let Some(vindex) = keyspace.vindex(&binding.vindex) {
                    if vindex.needs_lookup() {
                        if let Some(value) = bound.resolve(params) {
                            let mut plan = base(PlanKind::Lookup, keyspace.shard_names());
                            plan.lookup = Some(LookupSpec {
                                vindex: binding.vindex.clone(),
                                value,
                            });
                            return Ok(plan);
                        }
                    }
                }
            }
        }
    }

    // Rule 8: an equality on the sharding column routes to one shard.
    if let Some((column, bound)) = &stmt.where_equality {
        if column.eq_ignore_ascii_case(primary.column()) {
            if let Some(value) = bound.resolve(params) {
                let shard = resolve_shard(keyspace, &primary.vindex, &value)?;
                return Ok(base(PlanKind::SingleShard, vec![shard]));
            }
        }
    }

    // Rule 9: sharded INSERTs must carry the sharding-column value.
    if stmt.kind == StatementKind::Insert {
        let value = stmt
            .insert_value(primary.column())
            .and_then(|bound| bound.resolve(params));
        let Some(value) = value else {
            return Err(Error::ShardingKeyRequired(format!(
                "insert into {} requires a value for sharding column {}",
                table_name,
                primary.column()
            )));
        };
        let shard = resolve_shard(keyspace, &primary.vindex, &value)?;
        return Ok(base(PlanKind::SingleShard, vec![shard]));
    }

    // Rule 10: everything else scatters.
    Ok(base(scatter_kind(&stmt), keyspace.shard_names()))
}

fn scatter_kind(stmt: &Statement) -> PlanKind {
    if stmt.kind == StatementKind::Select && stmt.has_aggregates() {
        PlanKind::ScatterAggregate
    } else {
        PlanKind::Scatter
    }
}

/// Map a value through a vindex and pick its shard, honoring vindexes that
/// own their placement (consistent hash, range).
fn resolve_shard(keyspace: &Keyspace, vindex_name: &str, value: &SqlValue) -> Result<String, Error> {
    let vindex = keyspace.vindex(vindex_name).ok_or_else(|| {
        Error::InvalidVSchema(format!("vindex {vindex_name} disappeared from keyspace"))
    })?;

    let ids = vindex.map(value)?;
    let id = *ids.first().ok_or_else(|| {
        Error::ShardUnavailable(format!("vindex {vindex_name} mapped no keyspace id"))
    })?;

    if let Some(shard) = vindex.shard_hint(value, id)? {
        return Ok(shard);
    }

    Ok(route_to_shard(id, &keyspace.shards)?.name().to_string())
}

fn truncate(sql: &str) -> String {
    const MAX: usize = 120;
    if sql.len() <= MAX {
        sql.to_string()
    } else {
        format!("{}…", &sql[..MAX])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vschema::VSchema;

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

    #[test]
    fn point_read_plans_single_shard() {
        let vschema = sharded_vschema();
        let plan = plan(
            &vschema,
            "SELECT * FROM users WHERE id = $1",
            &[SqlValue::Int(42)],
        )
        .unwrap();

        assert_eq!(plan.kind, PlanKind::SingleShard);
        assert_eq!(plan.shards.len(), 1);
        assert!(["-80", "80-"].contains(&plan.shards[0].as_str()));
    }

    #[test]
    fn planning_is_pure() {
        let vschema = sharded_vschema();
        let a = plan(
            &vschema,
            "SELECT * FROM users WHERE id = $1",
            &[SqlValue::Int(42)],
        )
        .unwrap();
        for _ in 0..10 {
            let b = plan(
                &vschema,
                "SELECT * FROM users WHERE id = $1",
                &[SqlValue::Int(42)],
            )
            .unwrap();
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.shards, b.shards);
        }
    }

    #[test]
    fn select_without_equality_scatters() {
        let vschema = sharded_vschema();
        let plan = plan(&vschema, "SELECT * FROM users", &[]).unwrap();
        assert_eq!(plan.kind, PlanKind::Scatter);
        assert_eq!(plan.shards, vec!["-80", "80-"]);
    }

    #[test]
    fn aggregates_promote_to_scatter_aggregate() {
        let vschema = sharded_vschema();
        let plan = plan(&vschema, "SELECT COUNT(*) FROM users", &[]).unwrap();
        assert_eq!(plan.kind, PlanKind::ScatterAggregate);
        assert_eq!(plan.aggregates.len(), 1);
    }

    #[test]
    fn lookup_column_plans_lookup() {
        let vschema = sharded_vschema();
        let plan = plan(
            &vschema,
            "SELECT * FROM users WHERE name = $1",
            &[SqlValue::Text("alice".into())],
        )
        .unwrap();

        assert_eq!(plan.kind, PlanKind::Lookup);
        assert_eq!(plan.shards, vec!["-80", "80-"]);
        let lookup = plan.lookup.unwrap();
        assert_eq!(lookup.vindex, "name_lookup");
        assert_eq!(lookup.value, SqlValue::Text("alice".into()));
    }

    #[test]
    fn insert_without_sharding_key_fails() {
        let vschema = sharded_vschema();
        let err = plan(
            &vschema,
            "INSERT INTO users (name) VALUES ($1)",
            &[SqlValue::Text("bob".into())],
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShardingKeyRequired(_)));
    }

    #[test]
    fn insert_with_sharding_key_plans_single_shard() {
        let vschema = sharded_vschema();
        let plan = plan(
            &vschema,
            "INSERT INTO users (id, name) VALUES ($1, $2)",
            &[SqlValue::Int(7), SqlValue::Text("bob".into())],
        )
        .unwrap();
        assert_eq!(plan.kind, PlanKind::SingleShard);
        assert_eq!(plan.shards.len(), 1);
    }

    #[test]
    fn unsharded_keyspace_plans_unsharded() {
        let vschema = VSchema::from_json(
            r#"{ "keyspaces": { "main": { "tables": { "settings": {} } } } }"#,
        )
        .unwrap();
        let plan = plan(&vschema, "SELECT * FROM settings", &[]).unwrap();
        assert_eq!(plan.kind, PlanKind::Unsharded);
        assert_eq!(plan.shards, vec!["-"]);
    }

    #[test]
    fn unparseable_sql_is_rejected() {
        let vschema = sharded_vschema();
        let err = plan(&vschema, "VACUUM FULL", &[]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSql(_)));
    }

    #[test]
    fn unknown_keyspace_qualifier_fails() {
        let vschema = sharded_vschema();
        let err = plan(&vschema, "SELECT * FROM nowhere.users", &[]).unwrap_err();
        assert!(matches!(err, Error::NoKeyspace));
    }

    #[test]
    fn table_name_normalizes_to_vschema_spelling() {
        let vschema = sharded_vschema();
        let plan = plan(&vschema, "SELECT * FROM USERS", &[]).unwrap();
        assert_eq!(plan.table.as_deref(), Some("users"));
    }
}
