use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// A typed field value, produced by coercing a shard's raw value into the
/// aggregator schema's declared type.
///
/// Values are totally ordered so they can live in a `BTreeSet` and be used as
/// sort keys. Variants of different kinds order by kind first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
}

impl FieldValue {
    /// Map a JSON scalar to a value. `null`, arrays and objects have no
    /// scalar form and map to `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Int(i))
                } else {
                    n.as_f64().map(|f| FieldValue::Float(OrderedFloat(f)))
                }
            }
            Value::String(s) => Some(FieldValue::Str(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    #[inline]
    pub fn float(f: f64) -> Self {
        FieldValue::Float(OrderedFloat(f))
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view, used by numeric merge strategies.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(f.0),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(f.0)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v.0),
            FieldValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(OrderedFloat(f))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// The merged value of one field in a merged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MergedValue {
    /// Value of a single-valued field
    Single(FieldValue),
    /// Deduplicated values of a multi-valued field
    Multi(BTreeSet<FieldValue>),
}

impl MergedValue {
    pub fn multi<I: IntoIterator<Item = FieldValue>>(values: I) -> Self {
        MergedValue::Multi(values.into_iter().collect())
    }

    pub fn as_single(&self) -> Option<&FieldValue> {
        match self {
            MergedValue::Single(v) => Some(v),
            MergedValue::Multi(_) => None,
        }
    }

    pub fn as_multi(&self) -> Option<&BTreeSet<FieldValue>> {
        match self {
            MergedValue::Single(_) => None,
            MergedValue::Multi(set) => Some(set),
        }
    }

    pub fn contains(&self, value: &FieldValue) -> bool {
        match self {
            MergedValue::Single(v) => v == value,
            MergedValue::Multi(set) => set.contains(value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MergedValue::Single(_) => 1,
            MergedValue::Multi(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turn the value into a set, promoting a single value.
    pub fn into_set(self) -> BTreeSet<FieldValue> {
        match self {
            MergedValue::Single(v) => BTreeSet::from([v]),
            MergedValue::Multi(set) => set,
        }
    }
}

impl From<FieldValue> for MergedValue {
    fn from(v: FieldValue) -> Self {
        MergedValue::Single(v)
    }
}
