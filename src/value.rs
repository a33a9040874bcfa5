//! The dynamically typed tree that querystrings decode into and encode from.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::map::Map;

/// A node of a decoded (or to-be-encoded) querystring.
///
/// Decoding only ever produces `String`, `Null`, `Array` and `Object`
/// nodes. The remaining variants exist so that callers can hand richer
/// data to [`encode`](crate::encode).
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// An explicit null, e.g. the value of `a` in `a` under strict null handling.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Raw bytes. These are percent-encoded as-is rather than as text.
    Bytes(Vec<u8>),
    /// A point in time, rendered with the configured date serializer.
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Map),
    /// A reference-counted node. Sharing the same node in several places
    /// builds a DAG; storing a node inside itself builds a cycle, which
    /// the encoder reports as [`Error::CyclicReference`](crate::Error::CyclicReference).
    Shared(SharedValue),
    /// A hole: "nothing here". Used for sparse list slots while decoding
    /// and to elide values from a filter. Never part of a decoded result.
    Undefined,
}

/// A shared, mutable handle to a [`Value`].
///
/// Equality is identity: two handles are equal only if they point at the
/// same node. This keeps comparisons of cyclic graphs finite.
#[derive(Clone)]
pub struct SharedValue(Rc<RefCell<Value>>);

impl SharedValue {
    pub fn new(value: Value) -> Self {
        SharedValue(Rc::new(RefCell::new(value)))
    }

    /// Borrows the inner value.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently mutably borrowed via [`SharedValue::set`].
    pub fn borrow(&self) -> Ref<'_, Value> {
        self.0.borrow()
    }

    /// Replaces the inner value, returning the old one.
    ///
    /// This is how a cycle is built:
    ///
    /// ```
    /// use qs_codec::{Map, SharedValue, Value};
    ///
    /// let node = SharedValue::new(Value::Null);
    /// let mut map = Map::new();
    /// map.insert("self", Value::Shared(node.clone()));
    /// node.set(Value::Object(map));
    /// ```
    pub fn set(&self, value: Value) -> Value {
        self.0.replace(value)
    }

    pub(crate) fn as_ptr(&self) -> *const RefCell<Value> {
        Rc::as_ptr(&self.0)
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:p})", self.as_ptr())
    }
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub const fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Convenience constructor for [`Value::Bytes`].
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    /// Wraps `self` into a fresh [`SharedValue`].
    pub fn shared(self) -> Self {
        Value::Shared(SharedValue::new(self))
    }

    /// Indexes into an object by key or an array by position.
    ///
    /// Returns `None` when the key is missing or `self` is a scalar.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(m) => m.get(key),
            Value::Array(a) => key.parse::<usize>().ok().and_then(|i| a.get(i)),
            _ => None,
        }
    }

    /// `true` for `Array`, `Object` and `Shared` nodes (which may contain either).
    pub(crate) fn is_composite(&self) -> bool {
        match self {
            Value::Array(_) | Value::Object(_) => true,
            Value::Shared(s) => s.borrow().is_composite(),
            _ => false,
        }
    }

    /// The textual form used when a scalar is written into a querystring.
    ///
    /// Composite values, `Null` and `Undefined` have no textual form.
    pub(crate) fn scalar_string(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_owned()),
            Value::Int(i) => {
                let mut buffer = itoa::Buffer::new();
                Some(buffer.format(*i).to_owned())
            }
            Value::Float(f) => Some(format_float(*f)),
            Value::String(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Date(d) => Some(default_date_string(d)),
            Value::Shared(s) => s.borrow().scalar_string(),
            Value::Null | Value::Undefined | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Renders a float the way JavaScript's `Number#toString` does for the
/// common cases: integral values have no fractional part.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if f.fract() == 0.0 && f.abs() < 1e21 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        let mut buffer = itoa::Buffer::new();
        return buffer.format(f as i64).to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format_finite(f).to_owned()
}

/// `2023-01-01T00:00:00.001Z`
pub(crate) fn default_date_string(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! from_integer {
    ($($ty:ty)*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(value as i64)
                }
            }
        )*
    };
}

from_integer! { i8 i16 i32 i64 u16 u32 }

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(value)
    }
}

impl From<SharedValue> for Value {
    fn from(value: SharedValue) -> Self {
        Value::Shared(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Undefined => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Date(d) => serializer.serialize_str(&default_date_string(d)),
            Value::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for element in arr {
                    seq.serialize_element(element)?;
                }
                seq.end()
            }
            Value::Object(obj) => {
                let mut map = serializer.serialize_map(Some(obj.len()))?;
                for (k, v) in obj.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            // a cyclic graph recurses without bound here; use `encode` for those
            Value::Shared(s) => s.borrow().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("any querystring value")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E> {
                Ok(Value::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E> {
                Ok(Value::Int(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E> {
                Ok(i64::try_from(value).map_or(Value::Float(value as f64), Value::Int))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E> {
                Ok(Value::Float(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E> {
                Ok(Value::String(value.to_owned()))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E> {
                Ok(Value::String(value))
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<Self::Value, E> {
                Ok(Value::Bytes(value.to_vec()))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut vec = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(elem) = seq.next_element()? {
                    vec.push(elem);
                }
                Ok(Value::Array(vec))
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut map = Map::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
