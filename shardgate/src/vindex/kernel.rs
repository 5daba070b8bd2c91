//! Byte-level hash kernels producing 64-bit keyspace ids.
//!
//! All three are deterministic and endian-stable: they walk input bytes in
//! order, mix in two independent 32-bit lanes, and emit the lanes
//! concatenated big-endian (first lane high). None of them is the real
//! MD5/xxHash/murmur3 digest; they are routing hashes, not cryptography.

use protocol::SqlValue;

use crate::errors::Error;
use crate::shard::KeyspaceId;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Double-FNV mix: lane one is FNV-1a, lane two FNV-1 (multiply before
/// xor), both over the full input.
pub fn md5_like(data: &[u8]) -> KeyspaceId {
    let mut h1 = FNV_OFFSET;
    let mut h2 = FNV_OFFSET;
    for &byte in data {
        h1 ^= byte as u32;
        h1 = h1.wrapping_mul(FNV_PRIME);

        h2 = h2.wrapping_mul(FNV_PRIME);
        h2 ^= byte as u32;
    }
    lanes(h1, h2)
}

const XX_PRIME1: u32 = 0x9e37_79b1;
const XX_PRIME2: u32 = 0x85eb_ca77;
const XX_PRIME3: u32 = 0xc2b2_ae3d;
const XX_PRIME4: u32 = 0x27d4_eb2f;
const XX_PRIME5: u32 = 0x1656_67b1;

/// Classic xxhash32 (seed 0); the second lane is an independent multiply of
/// the finalized hash pushed through the avalanche again.
pub fn xxhash_like(data: &[u8]) -> KeyspaceId {
    let mut h = if data.len() >= 16 {
        let mut v1 = XX_PRIME1.wrapping_add(XX_PRIME2);
        let mut v2 = XX_PRIME2;
        let mut v3 = 0u32;
        let mut v4 = 0u32.wrapping_sub(XX_PRIME1);

        let mut chunks = data.chunks_exact(16);
        for chunk in &mut chunks {
            v1 = xx_round(v1, read_u32(&chunk[0..4]));
            v2 = xx_round(v2, read_u32(&chunk[4..8]));
            v3 = xx_round(v3, read_u32(&chunk[8..12]));
            v4 = xx_round(v4, read_u32(&chunk[12..16]));
        }

        v1.rotate_left(1)
            .wrapping_add(v2.rotate_left(7))
            .wrapping_add(v3.rotate_left(12))
            .wrapping_add(v4.rotate_left(18))
    } else {
        XX_PRIME5
    };

    h = h.wrapping_add(data.len() as u32);

    let tail_start = (data.len() / 16) * 16;
    let mut tail = &data[tail_start..];
    while tail.len() >= 4 {
        h = h.wrapping_add(read_u32(&tail[0..4]).wrapping_mul(XX_PRIME3));
        h = h.rotate_left(17).wrapping_mul(XX_PRIME4);
        tail = &tail[4..];
    }
    for &byte in tail {
        h = h.wrapping_add((byte as u32).wrapping_mul(XX_PRIME5));
        h = h.rotate_left(11).wrapping_mul(XX_PRIME1);
    }

    let h1 = xx_avalanche(h);
    let h2 = xx_avalanche(h1.wrapping_mul(XX_PRIME2));
    lanes(h1, h2)
}

fn xx_round(acc: u32, lane: u32) -> u32 {
    acc.wrapping_add(lane.wrapping_mul(XX_PRIME2))
        .rotate_left(13)
        .wrapping_mul(XX_PRIME1)
}

fn xx_avalanche(mut h: u32) -> u32 {
    h ^= h >> 15;
    h = h.wrapping_mul(XX_PRIME2);
    h ^= h >> 13;
    h = h.wrapping_mul(XX_PRIME3);
    h ^= h >> 16;
    h
}

const MURMUR_C1: u32 = 0xcc9e_2d51;
const MURMUR_C2: u32 = 0x1b87_3593;

/// Standard murmur3-32 body and finalizer (seed 0); the second lane is
/// `fmix32(h * 0x9e3779b9)`.
pub fn murmur3_like(data: &[u8]) -> KeyspaceId {
    let h1 = murmur3_32(data, 0);
    let h2 = murmur_fmix(h1.wrapping_mul(0x9e37_79b9));
    lanes(h1, h2)
}

/// 32-bit murmur3, exposed for consistent-hash ring construction.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = read_u32(chunk);
        k = k.wrapping_mul(MURMUR_C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(MURMUR_C2);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let mut k = 0u32;
    for (i, &byte) in chunks.remainder().iter().enumerate() {
        k |= (byte as u32) << (8 * i);
    }
    if k != 0 {
        k = k.wrapping_mul(MURMUR_C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(MURMUR_C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    murmur_fmix(h)
}

fn murmur_fmix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn lanes(h1: u32, h2: u32) -> KeyspaceId {
    KeyspaceId(((h1 as u64) << 32) | h2 as u64)
}

/// Canonical bytes hashed for a value: integers as decimal text, bytes
/// verbatim, every other scalar as its canonical text. Null and non-scalar
/// values are rejected.
pub fn canonicalize(value: &SqlValue) -> Result<Vec<u8>, Error> {
    match value {
        SqlValue::Null => Err(Error::Type(
            "cannot compute a keyspace id for NULL".to_string(),
        )),
        SqlValue::Int(n) => Ok(n.to_string().into_bytes()),
        SqlValue::Numeric(s) => Ok(s.clone().into_bytes()),
        SqlValue::Bool(b) => Ok(if *b { b"true".to_vec() } else { b"false".to_vec() }),
        SqlValue::Float(x) => Ok(x.to_string().into_bytes()),
        SqlValue::Text(s) => Ok(s.clone().into_bytes()),
        SqlValue::Bytes(b) => Ok(b.clone()),
        SqlValue::Json(_) | SqlValue::Array(_) => Err(Error::Type(format!(
            "cannot compute a keyspace id for a {} value",
            value.type_name()
        ))),
    }
}
