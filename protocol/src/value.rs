//! The SQL value model shared by the router, tablets and clients.
//!
//! Values cross the wire as JSON. JSON cannot carry raw bytes or non-finite
//! floats, so byte payloads travel as `{"__type":"bytes","data":"<base64>"}`
//! and NaN/±Infinity as their literal strings. NUMERIC and anything wider
//! than i64 travels as a decimal string.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One row: an ordered map of column name to value.
pub type Row = IndexMap<String, SqlValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Lossless decimal string (NUMERIC, MONEY, out-of-range integers).
    Numeric(String),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<SqlValue>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Portable name of the value's host type.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "boolean",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "double",
            SqlValue::Numeric(_) => "numeric",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Json(_) => "json",
            SqlValue::Array(_) => "array",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(n) => Some(*n),
            SqlValue::Numeric(s) => s.parse().ok(),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(n) => Some(*n as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Numeric(s) | SqlValue::Text(s) => s.parse().ok(),
            SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Total ordering used for cross-shard MIN/MAX and ordered merges.
    ///
    /// Nulls sort first, then booleans, numbers (compared numerically across
    /// Int/Float/Numeric), text, bytes, json, arrays.
    pub fn sql_cmp(&self, other: &SqlValue) -> Ordering {
        use SqlValue::*;

        fn class(v: &SqlValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Int(_) | Float(_) | Numeric(_) => 2,
                Text(_) => 3,
                Bytes(_) => 4,
                Json(_) => 5,
                Array(_) => 6,
            }
        }

        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (a, b) if class(a) == 2 && class(b) == 2 => {
                let (x, y) = (a.as_f64(), b.as_f64());
                match (x, y) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
            }
            (Text(a), Text(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Array(a), Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.sql_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => class(a).cmp(&class(b)),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(n) => write!(f, "{}", n),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Numeric(s) | SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            SqlValue::Json(v) => write!(f, "{}", v),
            SqlValue::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<i32> for SqlValue {
    fn from(n: i32) -> Self {
        SqlValue::Int(n as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(x: f64) -> Self {
        SqlValue::Float(x)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(b: Vec<u8>) -> Self {
        SqlValue::Bytes(b)
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
            SqlValue::Int(n) => serializer.serialize_i64(*n),
            SqlValue::Float(x) => {
                if x.is_finite() {
                    serializer.serialize_f64(*x)
                } else if x.is_nan() {
                    serializer.serialize_str("NaN")
                } else if *x > 0.0 {
                    serializer.serialize_str("Infinity")
                } else {
                    serializer.serialize_str("-Infinity")
                }
            }
            SqlValue::Numeric(s) => serializer.serialize_str(s),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::Bytes(b) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("__type", "bytes")?;
                map.serialize_entry("data", &base64::encode(b))?;
                map.end()
            }
            SqlValue::Json(v) => v.serialize(serializer),
            SqlValue::Array(values) => values.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SqlValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(from_json(raw))
    }
}

/// Decode a JSON tree into the value model, honoring the bytes escape.
pub fn from_json(raw: serde_json::Value) -> SqlValue {
    match raw {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                // Beyond i64: keep it lossless as a decimal string.
                SqlValue::Numeric(u.to_string())
            } else {
                SqlValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => SqlValue::Text(s),
        serde_json::Value::Array(items) => {
            SqlValue::Array(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => {
            if map.get("__type").and_then(|t| t.as_str()) == Some("bytes") {
                if let Some(data) = map.get("data").and_then(|d| d.as_str()) {
                    if let Ok(bytes) = base64::decode(data) {
                        return SqlValue::Bytes(bytes);
                    }
                }
            }
            SqlValue::Json(serde_json::Value::Object(map))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip_through_json() {
        let value = SqlValue::Bytes(vec![0x00, 0xff, 0x10]);
        let encoded = serde_json::to_string(&value).unwrap();
        assert!(encoded.contains("\"__type\":\"bytes\""));

        let decoded: SqlValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn non_finite_floats_encode_as_strings() {
        let encoded = serde_json::to_string(&SqlValue::Float(f64::NAN)).unwrap();
        assert_eq!(encoded, "\"NaN\"");

        let encoded = serde_json::to_string(&SqlValue::Float(f64::NEG_INFINITY)).unwrap();
        assert_eq!(encoded, "\"-Infinity\"");
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(
            SqlValue::Int(2).sql_cmp(&SqlValue::Float(2.5)),
            Ordering::Less
        );
        assert_eq!(
            SqlValue::Numeric("10".into()).sql_cmp(&SqlValue::Int(9)),
            Ordering::Greater
        );
    }

    #[test]
    fn nulls_sort_first() {
        assert_eq!(
            SqlValue::Null.sql_cmp(&SqlValue::Int(i64::MIN)),
            Ordering::Less
        );
    }

    #[test]
    fn plain_object_decodes_as_json() {
        let decoded: SqlValue = serde_json::from_str(r#"{"a":1}"#).unwrap();
        assert!(matches!(decoded, SqlValue::Json(_)));
    }
}
