use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of the shard a document came from.
///
/// Only used as a deterministic tie-break and for provenance; it never
/// influences merged values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ShardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Sort key values of one document, one per named sort field
pub type SortValues = SmallVec<[Option<FieldValue>; 2]>;

/// One shard's fragment of a logical document.
///
/// `id` is unique within `shard` only. Raw field values are kept as the shard
/// sent them (a scalar or an array) until the reducer coerces them.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardDocument {
    pub id: String,
    pub shard: ShardId,
    /// Position in the shard's own ranked response
    pub order_in_shard: usize,
    pub score: Option<f32>,
    pub sort_values: SortValues,
    pub fields: BTreeMap<String, Value>,
}

impl ShardDocument {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, shard: impl Into<ShardId>, order_in_shard: usize) -> Self {
        Self {
            id: id.into(),
            shard: shard.into(),
            order_in_shard,
            score: None,
            sort_values: SmallVec::new(),
            fields: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_sort_values<I: IntoIterator<Item = Option<FieldValue>>>(mut self, values: I) -> Self {
        self.sort_values = values.into_iter().collect();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    #[inline]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
