//! Dynamic value type for stored payloads.

use crate::entry::TypeTag;
use crate::error::{CodecError, CodecResult};
use std::collections::BTreeMap;

/// A stored value.
///
/// This is the closed set of shapes kvault persists: the JSON-serializable
/// universe plus raw byte sequences. The codec derives an explicit type tag
/// from the variant at encode time, so decode never has to guess between
/// JSON's loose number types (int vs double, string vs bytes).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Signed integer (full i64 range).
    Int(i64),
    /// Double-precision float. Must be finite to be encodable.
    Double(f64),
    /// Boolean value.
    Bool(bool),
    /// Text string (UTF-8).
    Str(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed map of values.
    Map(BTreeMap<String, Value>),
    /// Raw byte sequence.
    Bytes(Vec<u8>),
}

impl Value {
    /// The explicit type tag for this value, derived from its shape.
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Int(_) => TypeTag::Int,
            Value::Double(_) => TypeTag::Double,
            Value::Bool(_) => TypeTag::Bool,
            Value::Str(_) => TypeTag::Str,
            Value::List(_) => TypeTag::List,
            Value::Map(_) => TypeTag::Map,
            Value::Bytes(_) => TypeTag::Bytes,
        }
    }

    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a double, if it is one.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a list, if it is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte sequence.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to the JSON wire representation.
    ///
    /// Bytes ride through JSON as an array of integers; the type tag in the
    /// frame restores them on decode.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NonFiniteNumber`] for NaN or infinite doubles,
    /// which have no JSON representation.
    pub fn to_json(&self) -> CodecResult<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .ok_or(CodecError::NonFiniteNumber)?,
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Str(s) => serde_json::Value::from(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<CodecResult<Vec<_>>>()?,
            ),
            Value::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json()?);
                }
                serde_json::Value::Object(map)
            }
            Value::Bytes(b) => {
                serde_json::Value::Array(b.iter().map(|&byte| byte.into()).collect())
            }
        })
    }

    /// Convert from JSON by structural inference.
    ///
    /// Used for values nested inside lists and maps, which carry no tag of
    /// their own: integer-shaped numbers become [`Value::Int`], all other
    /// numbers become [`Value::Double`]. Bytes never appear nested.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::MAX)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert from JSON under an explicit type tag.
    ///
    /// Returns `None` when the JSON shape does not match the tag; the caller
    /// treats that record as corrupt rather than coercing.
    #[must_use]
    pub fn from_json_tagged(tag: TypeTag, json: &serde_json::Value) -> Option<Value> {
        match tag {
            TypeTag::Null => json.is_null().then_some(Value::Null),
            TypeTag::Int => json.as_i64().map(Value::Int),
            TypeTag::Double => json.as_f64().map(Value::Double),
            TypeTag::Bool => json.as_bool().map(Value::Bool),
            TypeTag::Str => json.as_str().map(|s| Value::Str(s.to_string())),
            TypeTag::List => json
                .as_array()
                .map(|items| Value::List(items.iter().map(Value::from_json).collect())),
            TypeTag::Map => json.as_object().map(|map| {
                Value::Map(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }),
            TypeTag::Bytes => {
                let items = json.as_array()?;
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    bytes.push(u8::try_from(item.as_u64()?).ok()?);
                }
                Some(Value::Bytes(bytes))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
