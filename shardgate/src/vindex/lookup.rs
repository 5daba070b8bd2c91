//! Lookup vindexes resolve through a secondary table instead of a hash.
//!
//! The backing table is abstracted as a value → {keyspace-id…} multimap
//! behind [`LookupStore`]; the in-memory implementation serves tests and
//! single-process deployments.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use protocol::SqlValue;

use crate::errors::Error;
use crate::shard::KeyspaceId;
use crate::vindex::kernel;

/// Async access to the secondary lookup table of one or more lookup
/// vindexes, keyed by vindex name.
#[async_trait]
pub trait LookupStore: Send + Sync {
    async fn get(&self, vindex: &str, value: &SqlValue) -> Result<Vec<KeyspaceId>, Error>;
    async fn put(&self, vindex: &str, value: &SqlValue, id: KeyspaceId) -> Result<(), Error>;
    async fn remove(&self, vindex: &str, value: &SqlValue, id: KeyspaceId) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Lookup,
    LookupHash,
    LookupUnique,
}

#[derive(Debug, Clone)]
pub struct LookupVindex {
    kind: LookupKind,
    /// Informational params from the VSchema (backing table, from/to
    /// columns). Resolution itself goes through the [`LookupStore`].
    pub table: Option<String>,
    pub from_column: Option<String>,
    pub to_column: Option<String>,
}

impl LookupVindex {
    pub fn from_params(kind: &str, params: Option<&serde_json::Value>) -> Self {
        let get = |key: &str| {
            params
                .and_then(|p| p.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            kind: match kind {
                "lookup_unique" => LookupKind::LookupUnique,
                "lookup_hash" => LookupKind::LookupHash,
                _ => LookupKind::Lookup,
            },
            table: get("table"),
            from_column: get("from"),
            to_column: get("to"),
        }
    }

    pub fn unique(&self) -> bool {
        self.kind == LookupKind::LookupUnique
    }

    /// Resolve each value to its keyspace ids. Unknown values resolve to an
    /// empty set, not an error.
    pub async fn lookup(
        &self,
        name: &str,
        values: &[SqlValue],
        store: &dyn LookupStore,
    ) -> Result<Vec<Vec<KeyspaceId>>, Error> {
        let mut resolved = Vec::with_capacity(values.len());
        for value in values {
            resolved.push(store.get(name, value).await?);
        }
        Ok(resolved)
    }

    /// Check that each `(value, id)` pair is present in the lookup table.
    pub async fn verify(
        &self,
        name: &str,
        values: &[SqlValue],
        ids: &[KeyspaceId],
        store: &dyn LookupStore,
    ) -> Result<Vec<bool>, Error> {
        if values.len() != ids.len() {
            return Err(Error::Type(
                "verify requires matching value and id lists".to_string(),
            ));
        }
        let mut results = Vec::with_capacity(values.len());
        for (value, id) in values.iter().zip(ids) {
            results.push(store.get(name, value).await?.contains(id));
        }
        Ok(results)
    }

    /// Insert `(value, id)` entries. A unique lookup refuses a second
    /// distinct id for the same value.
    pub async fn create(
        &self,
        name: &str,
        values: &[SqlValue],
        ids: &[KeyspaceId],
        store: &dyn LookupStore,
    ) -> Result<(), Error> {
        if values.len() != ids.len() {
            return Err(Error::Type(
                "create requires matching value and id lists".to_string(),
            ));
        }
        for (value, id) in values.iter().zip(ids) {
            if self.unique() {
                let existing = store.get(name, value).await?;
                if existing.iter().any(|e| e != id) {
                    return Err(Error::Wire(protocol::WireError::new(
                        protocol::ErrorCode::UniqueViolation,
                        format!("lookup {name} already maps {value} to another keyspace id"),
                    )));
                }
            }
            store.put(name, value, *id).await?;
        }
        Ok(())
    }

    pub async fn delete(
        &self,
        name: &str,
        values: &[SqlValue],
        ids: &[KeyspaceId],
        store: &dyn LookupStore,
    ) -> Result<(), Error> {
        if values.len() != ids.len() {
            return Err(Error::Type(
                "delete requires matching value and id lists".to_string(),
            ));
        }
        for (value, id) in values.iter().zip(ids) {
            store.remove(name, value, *id).await?;
        }
        Ok(())
    }
}

/// Process-local lookup table. Values are keyed by their canonical hash
/// bytes so `42` and `'42'` resolve identically, matching kernel
/// canonicalization.
#[derive(Default)]
pub struct MemoryLookupStore {
    entries: RwLock<HashMap<String, HashMap<Vec<u8>, BTreeSet<u64>>>>,
}

impl MemoryLookupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LookupStore for MemoryLookupStore {
    async fn get(&self, vindex: &str, value: &SqlValue) -> Result<Vec<KeyspaceId>, Error> {
        let key = kernel::canonicalize(value)?;
        let entries = self.entries.read().expect("lookup store lock poisoned");
        Ok(entries
            .get(vindex)
            .and_then(|m| m.get(&key))
            .map(|ids| ids.iter().map(|&n| KeyspaceId(n)).collect())
            .unwrap_or_default())
    }

    async fn put(&self, vindex: &str, value: &SqlValue, id: KeyspaceId) -> Result<(), Error> {
        let key = kernel::canonicalize(value)?;
        let mut entries = self.entries.write().expect("lookup store lock poisoned");
        entries
            .entry(vindex.to_string())
            .or_default()
            .entry(key)
            .or_default()
            .insert(id.0);
        Ok(())
    }

    async fn remove(&self, vindex: &str, value: &SqlValue, id: KeyspaceId) -> Result<(), Error> {
        let key = kernel::canonicalize(value)?;
        let mut entries = self.entries.write().expect("lookup store lock poisoned");
        if let Some(by_value) = entries.get_mut(vindex) {
            if let Some(ids) = by_value.get_mut(&key) {
                ids.remove(&id.0);
                if ids.is_empty() {
                    by_value.remove(&key);
                }
            }
        }
        Ok(())
    }
}
