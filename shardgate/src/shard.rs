//! Keyspace ids and shard ranges.
//!
//! The keyspace is the interval `[0, 2^64)`. A shard owns a half-open
//! interval of it, written as two hex strings around a `-`; each side is
//! left-padded with zeros to 16 digits to form the bound, and an empty side
//! means 0 (left) or 2^64 (right). `-` alone is the full keyspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// 8-byte big-endian position in the keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyspaceId(pub u64);

impl KeyspaceId {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        KeyspaceId(u64::from_be_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// The 32-bit ring key used by consistent-hash vindexes.
    pub fn ring_key(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for KeyspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// Half-open interval `[start, end)` of keyspace ids. `end == None` means
/// 2^64. The textual spelling is preserved: it doubles as the shard's name
/// on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShardRange {
    text: String,
    start: u64,
    end: Option<u64>,
}

impl ShardRange {
    pub fn parse(text: &str) -> Result<Self, Error> {
        let Some((left, right)) = text.split_once('-') else {
            return Err(Error::InvalidVSchema(format!(
                "shard range {text:?} is missing '-'"
            )));
        };

        let start = if left.is_empty() {
            0
        } else {
            parse_bound(left)
                .ok_or_else(|| Error::InvalidVSchema(format!("bad hex bound {left:?}")))?
        };
        let end = if right.is_empty() {
            None
        } else {
            Some(
                parse_bound(right)
                    .ok_or_else(|| Error::InvalidVSchema(format!("bad hex bound {right:?}")))?,
            )
        };

        if let Some(end) = end {
            if start >= end {
                return Err(Error::InvalidVSchema(format!(
                    "shard range {text:?} is empty or inverted"
                )));
            }
        }

        Ok(Self {
            text: text.to_string(),
            start,
            end,
        })
    }

    /// The full keyspace, `-`.
    pub fn full() -> Self {
        Self {
            text: "-".to_string(),
            start: 0,
            end: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.text
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    pub fn contains(&self, id: KeyspaceId) -> bool {
        id.0 >= self.start && self.end.map_or(true, |end| id.0 < end)
    }

    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end.is_none()
    }
}

impl PartialEq for ShardRange {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl Eq for ShardRange {}

impl fmt::Display for ShardRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl TryFrom<String> for ShardRange {
    type Error = Error;

    fn try_from(text: String) -> Result<Self, Error> {
        ShardRange::parse(&text)
    }
}

impl From<ShardRange> for String {
    fn from(range: ShardRange) -> String {
        range.text
    }
}

fn parse_bound(side: &str) -> Option<u64> {
    if side.len() > 16 || !side.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    // Left-pad to 16 hex digits.
    u64::from_str_radix(side, 16).ok()
}

/// Sort ranges by start and verify they partition `[0, 2^64)` with no
/// overlaps and no gaps.
pub fn validate_partition(shards: &mut Vec<ShardRange>) -> Result<(), Error> {
    if shards.is_empty() {
        return Err(Error::InvalidVSchema("keyspace has no shards".into()));
    }
    shards.sort_by_key(|s| s.start);

    if shards[0].start != 0 {
        return Err(Error::InvalidVSchema(format!(
            "shard list does not start at 0 (first shard is {})",
            shards[0]
        )));
    }

    for window in shards.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        match a.end {
            None => {
                return Err(Error::InvalidVSchema(format!(
                    "shard {a} overlaps shard {b}"
                )));
            }
            Some(end) if end != b.start => {
                let kind = if end > b.start { "overlaps" } else { "leaves a gap before" };
                return Err(Error::InvalidVSchema(format!("shard {a} {kind} shard {b}")));
            }
            Some(_) => {}
        }
    }

    if shards.last().unwrap().end.is_some() {
        return Err(Error::InvalidVSchema(
            "shard list does not reach the end of the keyspace".into(),
        ));
    }

    Ok(())
}

/// Binary-search the (sorted) shard list for the unique range containing
/// `id`. Absence means the VSchema partition invariant was violated.
pub fn route_to_shard(id: KeyspaceId, shards: &[ShardRange]) -> Result<&ShardRange, Error> {
    let idx = shards.partition_point(|s| s.start <= id.0);
    if idx > 0 && shards[idx - 1].contains(id) {
        return Ok(&shards[idx - 1]);
    }
    Err(Error::ShardUnavailable(format!(
        "no shard for keyspace id {id}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(names: &[&str]) -> Vec<ShardRange> {
        names.iter().map(|n| ShardRange::parse(n).unwrap()).collect()
    }

    #[test]
    fn parses_padded_bounds() {
        let range = ShardRange::parse("40-80").unwrap();
        assert_eq!(range.start(), 0x40);
        assert_eq!(range.end(), Some(0x80));

        let left_open = ShardRange::parse("-80").unwrap();
        assert_eq!(left_open.start(), 0);
        assert_eq!(left_open.end(), Some(0x80));

        let right_open = ShardRange::parse("80-").unwrap();
        assert_eq!(right_open.end(), None);

        assert!(ShardRange::parse("80").is_err());
        assert!(ShardRange::parse("80-40").is_err());
        assert!(ShardRange::parse("zz-").is_err());
    }

    #[test]
    fn full_range_contains_everything() {
        let full = ShardRange::parse("-").unwrap();
        assert!(full.is_full());
        assert!(full.contains(KeyspaceId(0)));
        assert!(full.contains(KeyspaceId(u64::MAX)));
    }

    #[test]
    fn partition_validation_catches_gaps_and_overlaps() {
        let mut good = ranges(&["-40", "40-80", "80-"]);
        assert!(validate_partition(&mut good).is_ok());

        let mut gap = ranges(&["-40", "80-"]);
        assert!(validate_partition(&mut gap).is_err());

        let mut overlap = ranges(&["-80", "40-"]);
        assert!(validate_partition(&mut overlap).is_err());

        let mut no_tail = ranges(&["-40", "40-80"]);
        assert!(validate_partition(&mut no_tail).is_err());
    }

    #[test]
    fn routing_finds_the_unique_owner() {
        let mut shards = ranges(&["-40", "40-80", "80-"]);
        validate_partition(&mut shards).unwrap();

        assert_eq!(
            route_to_shard(KeyspaceId(0), &shards).unwrap().name(),
            "-40"
        );
        assert_eq!(
            route_to_shard(KeyspaceId(0x40), &shards).unwrap().name(),
            "40-80"
        );
        assert_eq!(
            route_to_shard(KeyspaceId(0x7f), &shards).unwrap().name(),
            "40-80"
        );
        assert_eq!(
            route_to_shard(KeyspaceId(u64::MAX), &shards).unwrap().name(),
            "80-"
        );
    }

    #[test]
    fn every_boundary_id_has_exactly_one_owner() {
        let mut shards = ranges(&["-40", "40-80", "80-c0", "c0-"]);
        validate_partition(&mut shards).unwrap();

        for id in [0u64, 0x3f, 0x40, 0x7f, 0x80, 0xbf, 0xc0, u64::MAX] {
            let owners = shards
                .iter()
                .filter(|s| s.contains(KeyspaceId(id)))
                .count();
            assert_eq!(owners, 1, "id {id:#x} has {owners} owners");
        }
    }
}
