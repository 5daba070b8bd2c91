//! Vindexes: named mappings from column values to keyspace ids.
//!
//! Modeled as a closed enum — each variant is a small amount of data plus a
//! handful of methods, and the set is fixed by the wire/config contract.

pub mod kernel;
pub mod lookup;

use serde::Deserialize;

use protocol::SqlValue;

use crate::errors::Error;
use crate::shard::{KeyspaceId, ShardRange};

pub use lookup::{LookupStore, LookupVindex, MemoryLookupStore};

/// Default virtual-node factor for consistent-hash rings.
pub const DEFAULT_VIRTUAL_NODES: u32 = 150;

#[derive(Debug, Clone)]
pub enum Vindex {
    Hash,
    BinaryMd5,
    UnicodeLooseMd5,
    XxHash,
    Murmur,
    ConsistentHash(ConsistentHash),
    Range(RangeVindex),
    Lookup(LookupVindex),
}

impl Vindex {
    /// Build a vindex from its VSchema definition. `shards` is the owning
    /// keyspace's shard list (consistent-hash rings are derived from it).
    pub fn from_def(
        kind: &str,
        params: Option<&serde_json::Value>,
        shards: &[ShardRange],
    ) -> Result<Self, Error> {
        match kind {
            "hash" => Ok(Vindex::Hash),
            "binary_md5" => Ok(Vindex::BinaryMd5),
            "unicode_loose_md5" => Ok(Vindex::UnicodeLooseMd5),
            "xxhash" => Ok(Vindex::XxHash),
            "murmur" => Ok(Vindex::Murmur),
            "consistent_hash" => {
                let virtual_nodes = params
                    .and_then(|p| p.get("virtual_nodes"))
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(DEFAULT_VIRTUAL_NODES);
                Ok(Vindex::ConsistentHash(ConsistentHash::new(
                    shards,
                    virtual_nodes,
                )))
            }
            "range" | "numeric" => {
                let params = params.ok_or_else(|| {
                    Error::InvalidVSchema("range vindex requires interval params".into())
                })?;
                Ok(Vindex::Range(RangeVindex::from_params(params)?))
            }
            "lookup" | "lookup_hash" | "lookup_unique" => {
                Ok(Vindex::Lookup(LookupVindex::from_params(kind, params)))
            }
            other => Err(Error::InvalidVSchema(format!(
                "unknown vindex type {other:?}"
            ))),
        }
    }

    /// Whether a value maps to at most one keyspace id.
    pub fn unique(&self) -> bool {
        match self {
            Vindex::Lookup(lookup) => lookup.unique(),
            _ => true,
        }
    }

    /// Whether mapping requires an asynchronous lookup-table round trip.
    pub fn needs_lookup(&self) -> bool {
        matches!(self, Vindex::Lookup(_))
    }

    /// Synchronous value → keyspace-id mapping. Lookup vindexes fail here;
    /// they resolve through [`LookupVindex::lookup`].
    pub fn map(&self, value: &SqlValue) -> Result<Vec<KeyspaceId>, Error> {
        match self {
            Vindex::Hash | Vindex::BinaryMd5 => {
                Ok(vec![kernel::md5_like(&kernel::canonicalize(value)?)])
            }
            Vindex::UnicodeLooseMd5 => {
                let canon = kernel::canonicalize(value)?;
                let loose = String::from_utf8_lossy(&canon).trim().to_lowercase();
                Ok(vec![kernel::md5_like(loose.as_bytes())])
            }
            Vindex::XxHash => Ok(vec![kernel::xxhash_like(&kernel::canonicalize(value)?)]),
            Vindex::Murmur => Ok(vec![kernel::murmur3_like(&kernel::canonicalize(value)?)]),
            Vindex::ConsistentHash(_) => {
                Ok(vec![kernel::xxhash_like(&kernel::canonicalize(value)?)])
            }
            Vindex::Range(range) => Ok(vec![range.map(value)?]),
            Vindex::Lookup(_) => Err(Error::Query(
                "lookup vindex cannot be mapped synchronously".to_string(),
            )),
        }
    }

    /// Shard choice that bypasses range routing, for variants that own
    /// their placement (consistent-hash ring, range intervals).
    pub fn shard_hint(&self, value: &SqlValue, id: KeyspaceId) -> Result<Option<String>, Error> {
        match self {
            Vindex::ConsistentHash(ring) => Ok(Some(ring.shard_for(id).to_string())),
            Vindex::Range(range) => {
                let n = range.value_as_u64(value)?;
                Ok(Some(range.shard_for(n)?.to_string()))
            }
            _ => Ok(None),
        }
    }

    pub fn as_lookup(&self) -> Option<&LookupVindex> {
        match self {
            Vindex::Lookup(lookup) => Some(lookup),
            _ => None,
        }
    }
}

/// Consistent-hash ring over a shard list.
///
/// The ring holds `virtual_nodes` 32-bit keys per shard (murmur3 of
/// `"<shard>-<replica>"`), sorted ascending. A keyspace id lands on the
/// first ring entry at or above its ring key, wrapping to the start.
/// Rebuilding from the same shard list always yields the same ring.
#[derive(Debug, Clone)]
pub struct ConsistentHash {
    shards: Vec<String>,
    ring: Vec<(u32, u16)>,
}

impl ConsistentHash {
    pub fn new(shards: &[ShardRange], virtual_nodes: u32) -> Self {
        let shards: Vec<String> = shards.iter().map(|s| s.name().to_string()).collect();
        let mut ring = Vec::with_capacity(shards.len() * virtual_nodes as usize);
        for (idx, shard) in shards.iter().enumerate() {
            for replica in 0..virtual_nodes {
                let key = kernel::murmur3_32(format!("{shard}-{replica}").as_bytes(), 0);
                ring.push((key, idx as u16));
            }
        }
        ring.sort_unstable();
        Self { shards, ring }
    }

    pub fn shard_for(&self, id: KeyspaceId) -> &str {
        let key = id.ring_key();
        let idx = self.ring.partition_point(|(k, _)| *k < key);
        let (_, shard_idx) = if idx == self.ring.len() {
            self.ring[0]
        } else {
            self.ring[idx]
        };
        &self.shards[shard_idx as usize]
    }
}

#[derive(Deserialize, Debug, Clone)]
struct RangeIntervalDef {
    #[serde(default)]
    start: u64,
    end: Option<u64>,
    shard: String,
}

#[derive(Deserialize, Debug, Clone)]
struct RangeParams {
    ranges: Vec<RangeIntervalDef>,
}

/// Range vindex: the value itself, read as an integer in `[0, 2^64)`, is
/// the keyspace id; shard choice comes from configured intervals.
#[derive(Debug, Clone)]
pub struct RangeVindex {
    intervals: Vec<RangeIntervalDef>,
}

impl RangeVindex {
    fn from_params(params: &serde_json::Value) -> Result<Self, Error> {
        let parsed: RangeParams = serde_json::from_value(params.clone())
            .map_err(|e| Error::InvalidVSchema(format!("bad range vindex params: {e}")))?;
        let mut intervals = parsed.ranges;
        if intervals.is_empty() {
            return Err(Error::InvalidVSchema(
                "range vindex has no intervals".into(),
            ));
        }
        intervals.sort_by_key(|i| i.start);
        for window in intervals.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            if a.end.map_or(true, |end| end > b.start) {
                return Err(Error::InvalidVSchema(format!(
                    "range vindex intervals overlap at {}",
                    b.start
                )));
            }
        }
        Ok(Self { intervals })
    }

    fn value_as_u64(&self, value: &SqlValue) -> Result<u64, Error> {
        let n = match value {
            SqlValue::Int(n) if *n >= 0 => *n as u64,
            SqlValue::Numeric(s) | SqlValue::Text(s) => s
                .parse::<u64>()
                .map_err(|_| Error::Type(format!("range vindex value {s:?} is not a u64")))?,
            other => {
                return Err(Error::Type(format!(
                    "range vindex requires a non-negative integer, got {}",
                    other.type_name()
                )));
            }
        };
        Ok(n)
    }

    fn map(&self, value: &SqlValue) -> Result<KeyspaceId, Error> {
        Ok(KeyspaceId(self.value_as_u64(value)?))
    }

    fn shard_for(&self, n: u64) -> Result<&str, Error> {
        let idx = self.intervals.partition_point(|i| i.start <= n);
        if idx > 0 {
            let interval = &self.intervals[idx - 1];
            if interval.end.map_or(true, |end| n < end) {
                return Ok(&interval.shard);
            }
        }
        Err(Error::ShardUnavailable(format!(
            "no range interval contains {n}"
        )))
    }
}
