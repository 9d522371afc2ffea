/*!
The dynamic value model shared by the encoder and decoder.

A [`Value`] is one constructor per supported CBOR kind. Integers are a single
`i64` constructor covering major types 0 and 1, restricted to the range of
integers a double can represent exactly; values outside that range are
rejected at the codec boundary rather than promoted to a big-integer type.

Maps preserve encounter order, so `decode` followed by `encode` reproduces
the original entry order byte for byte.
*/
use core::fmt;

/// A single CBOR data item in the interchange subset.
#[derive(Clone, PartialEq)]
pub enum Value {
    /// Major type 0 or 1, within `[Value::MIN_INTEGER, Value::MAX_INTEGER]`.
    Integer(i64),
    /// Major type 2.
    Bytes(Vec<u8>),
    /// Major type 3, always valid UTF-8 on the wire.
    Text(String),
    /// Major type 4.
    Array(Vec<Value>),
    /// Major type 5, text-string keys only, encounter order preserved.
    Map(Vec<(String, Value)>),
    /// Major type 7, additional info 20/21.
    Bool(bool),
    /// Major type 7, additional info 22.
    Null,
    /// Major type 7, additional info 23.
    Undefined,
    /// Major type 7, additional info 25/26/27.
    Float(f64),
}

impl Value {
    /// Largest integer the model accepts: `2^53`, the last exactly
    /// double-representable value on the positive side.
    pub const MAX_INTEGER: i64 = 1 << 53;

    /// Smallest integer the model accepts: `-2^53`.
    pub const MIN_INTEGER: i64 = -(1 << 53);

    /// Builds a map value from `(key, value)` pairs in encounter order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds an array value.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Returns a human-readable name for the value's kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "byte string",
            Value::Text(_) => "text string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Float(_) => "float",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n:?}"),
            Value::Bytes(b) => write!(f, "bytes{b:02x?}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Map(entries) => {
                let mut m = f.debug_map();
                for (k, v) in entries {
                    m.entry(k, v);
                }
                m.finish()
            }
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => f.write_str("null"),
            Value::Undefined => f.write_str("undefined"),
            Value::Float(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<(String, Value)>> for Value {
    fn from(v: Vec<(String, Value)>) -> Self {
        Value::Map(v)
    }
}

/// One step of the traversal path from the root value to the current item.
///
/// Passed to transform hooks so they can act on position as well as content;
/// never retained by the codec beyond the current traversal.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PathSegment {
    /// A map entry, identified by its (possibly hook-replaced) key.
    Key(String),
    /// An array element, identified by its index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, ".{k}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}
