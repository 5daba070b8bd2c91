//! The VSchema binds tables to vindexes and keyspaces to shards.
//!
//! The JSON document shape is the configuration contract; [`VSchema`] is the
//! validated, compiled form the router actually consults.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::shard::{ShardRange, validate_partition};
use crate::vindex::Vindex;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VSchemaDoc {
    pub keyspaces: HashMap<String, KeyspaceDoc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeyspaceDoc {
    #[serde(default)]
    pub sharded: bool,
    #[serde(default)]
    pub shards: Option<Vec<String>>,
    #[serde(default)]
    pub vindexes: HashMap<String, VindexDef>,
    #[serde(default)]
    pub tables: HashMap<String, TableDef>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VindexDef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TableDef {
    #[serde(default)]
    pub column_vindexes: Vec<ColumnVindexDef>,
    #[serde(default)]
    pub auto_increment: Option<AutoIncrement>,
}

/// One column↔vindex binding. `column` and `columns` are alternative
/// spellings; exactly one must be present.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ColumnVindexDef {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AutoIncrement {
    pub column: String,
    pub sequence: String,
}

/// Compiled column binding: column list is non-empty, vindex is defined.
#[derive(Debug, Clone)]
pub struct ColumnBinding {
    pub columns: Vec<String>,
    pub vindex: String,
}

impl ColumnBinding {
    pub fn column(&self) -> &str {
        &self.columns[0]
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub column_vindexes: Vec<ColumnBinding>,
    pub auto_increment: Option<AutoIncrement>,
}

impl Table {
    /// The first binding: the vindex consulted for routing.
    pub fn primary(&self) -> Option<&ColumnBinding> {
        self.column_vindexes.first()
    }

    pub fn binding_for_column(&self, column: &str) -> Option<&ColumnBinding> {
        self.column_vindexes
            .iter()
            .find(|b| b.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }
}

#[derive(Debug, Clone)]
pub struct Keyspace {
    pub name: String,
    pub sharded: bool,
    /// Sorted; partitions the keyspace when sharded, single `-` otherwise.
    pub shards: Vec<ShardRange>,
    pub vindexes: HashMap<String, Arc<Vindex>>,
    pub tables: HashMap<String, Table>,
}

impl Keyspace {
    pub fn shard_names(&self) -> Vec<String> {
        self.shards.iter().map(|s| s.name().to_string()).collect()
    }

    /// Case-insensitive table lookup returning the canonical definition.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn vindex(&self, name: &str) -> Option<&Arc<Vindex>> {
        self.vindexes.get(name)
    }
}

#[derive(Debug, Clone)]
pub struct VSchema {
    keyspaces: HashMap<String, Keyspace>,
    doc: VSchemaDoc,
}

impl VSchema {
    pub fn from_doc(doc: VSchemaDoc) -> Result<Self, Error> {
        let mut keyspaces = HashMap::new();

        for (name, ks) in &doc.keyspaces {
            let mut shards = if ks.sharded {
                let listed = ks.shards.as_ref().ok_or_else(|| {
                    Error::InvalidVSchema(format!("sharded keyspace {name} lists no shards"))
                })?;
                listed
                    .iter()
                    .map(|s| ShardRange::parse(s))
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                vec![ShardRange::full()]
            };
            validate_partition(&mut shards)?;

            let mut vindexes = HashMap::new();
            for (vname, def) in &ks.vindexes {
                let vindex = Vindex::from_def(&def.kind, def.params.as_ref(), &shards)
                    .map_err(|e| {
                        Error::InvalidVSchema(format!("vindex {name}.{vname}: {e}"))
                    })?;
                vindexes.insert(vname.clone(), Arc::new(vindex));
            }

            let mut tables = HashMap::new();
            for (tname, def) in &ks.tables {
                let mut bindings = Vec::with_capacity(def.column_vindexes.len());
                for cv in &def.column_vindexes {
                    let columns = match (&cv.column, &cv.columns) {
                        (Some(col), None) => vec![col.clone()],
                        (None, Some(cols)) if !cols.is_empty() => cols.clone(),
                        _ => {
                            return Err(Error::InvalidVSchema(format!(
                                "table {name}.{tname}: binding for vindex {} must name \
                                 column or columns",
                                cv.name
                            )));
                        }
                    };
                    if !vindexes.contains_key(&cv.name) {
                        return Err(Error::InvalidVSchema(format!(
                            "table {name}.{tname} references undefined vindex {}",
                            cv.name
                        )));
                    }
                    bindings.push(ColumnBinding {
                        columns,
                        vindex: cv.name.clone(),
                    });
                }

                if ks.sharded && bindings.is_empty() {
                    return Err(Error::InvalidVSchema(format!(
                        "table {name}.{tname} on a sharded keyspace declares no \
                         column vindexes"
                    )));
                }

                tables.insert(
                    tname.clone(),
                    Table {
                        name: tname.clone(),
                        column_vindexes: bindings,
                        auto_increment: def.auto_increment.clone(),
                    },
                );
            }

            keyspaces.insert(
                name.clone(),
                Keyspace {
                    name: name.clone(),
                    sharded: ks.sharded,
                    shards,
                    vindexes,
                    tables,
                },
            );
        }

        Ok(Self { keyspaces, doc })
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let doc: VSchemaDoc = serde_json::from_str(json)
            .map_err(|e| Error::InvalidVSchema(format!("bad vschema document: {e}")))?;
        Self::from_doc(doc)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidVSchema(format!("cannot read vschema {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn doc(&self) -> &VSchemaDoc {
        &self.doc
    }

    pub fn keyspace(&self, name: &str) -> Option<&Keyspace> {
        self.keyspaces.get(name)
    }

    pub fn keyspace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keyspaces.keys().cloned().collect();
        names.sort();
        names
    }

    /// Rule 1 of the routing order: explicit qualifier, else the first
    /// keyspace containing the table, else the sole keyspace.
    pub fn resolve_keyspace(
        &self,
        explicit: Option<&str>,
        table: Option<&str>,
    ) -> Result<&Keyspace, Error> {
        if let Some(name) = explicit {
            return self.keyspaces.get(name).ok_or(Error::NoKeyspace);
        }

        if let Some(table) = table {
            // Deterministic scan order so planning stays pure.
            let mut names: Vec<&String> = self.keyspaces.keys().collect();
            names.sort();
            for name in names {
                let ks = &self.keyspaces[name];
                if ks.find_table(table).is_some() {
                    return Ok(ks);
                }
            }
        }

        if self.keyspaces.len() == 1 {
            return Ok(self.keyspaces.values().next().unwrap());
        }

        Err(Error::NoKeyspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_shard_doc() -> &'static str {
        r#"{
            "keyspaces": {
                "commerce": {
                    "sharded": true,
                    "shards": ["-80", "80-"],
                    "vindexes": {
                        "user_hash": { "type": "hash" }
                    },
                    "tables": {
                        "Users": {
                            "column_vindexes": [
                                { "column": "id", "name": "user_hash" }
                            ]
                        }
                    }
                }
            }
        }"#
    }

    #[test]
    fn compiles_and_finds_tables_case_insensitively() {
        let vschema = VSchema::from_json(two_shard_doc()).unwrap();
        let ks = vschema.keyspace("commerce").unwrap();
        assert!(ks.sharded);
        assert_eq!(ks.shard_names(), vec!["-80", "80-"]);

        let table = ks.find_table("users").unwrap();
        assert_eq!(table.name, "Users");
        assert_eq!(table.primary().unwrap().column(), "id");
    }

    #[test]
    fn rejects_undefined_vindex_reference() {
        let json = r#"{
            "keyspaces": {
                "k": {
                    "sharded": true,
                    "shards": ["-"],
                    "tables": {
                        "t": { "column_vindexes": [{ "column": "id", "name": "missing" }] }
                    }
                }
            }
        }"#;
        assert!(VSchema::from_json(json).is_err());
    }

    #[test]
    fn rejects_sharded_table_without_bindings() {
        let json = r#"{
            "keyspaces": {
                "k": {
                    "sharded": true,
                    "shards": ["-80", "80-"],
                    "tables": { "t": {} }
                }
            }
        }"#;
        assert!(VSchema::from_json(json).is_err());
    }

    #[test]
    fn rejects_non_partitioning_shard_list() {
        let json = r#"{
            "keyspaces": {
                "k": {
                    "sharded": true,
                    "shards": ["-40", "80-"],
                    "vindexes": { "h": { "type": "hash" } },
                    "tables": {
                        "t": { "column_vindexes": [{ "column": "id", "name": "h" }] }
                    }
                }
            }
        }"#;
        assert!(VSchema::from_json(json).is_err());
    }

    #[test]
    fn unsharded_keyspace_gets_the_full_shard() {
        let json = r#"{ "keyspaces": { "main": { "tables": { "t": {} } } } }"#;
        let vschema = VSchema::from_json(json).unwrap();
        let ks = vschema.keyspace("main").unwrap();
        assert!(!ks.sharded);
        assert_eq!(ks.shard_names(), vec!["-"]);
    }

    #[test]
    fn keyspace_resolution_prefers_explicit_then_table_then_sole() {
        let json = r#"{
            "keyspaces": {
                "a": { "tables": { "orders": {} } },
                "b": { "tables": { "users": {} } }
            }
        }"#;
        let vschema = VSchema::from_json(json).unwrap();

        assert_eq!(
            vschema.resolve_keyspace(Some("b"), None).unwrap().name,
            "b"
        );
        assert_eq!(
            vschema.resolve_keyspace(None, Some("orders")).unwrap().name,
            "a"
        );
        assert!(matches!(
            vschema.resolve_keyspace(None, Some("unknown")),
            Err(Error::NoKeyspace)
        ));
        assert!(matches!(
            vschema.resolve_keyspace(Some("zzz"), None),
            Err(Error::NoKeyspace)
        ));
    }
}
