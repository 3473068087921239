//! Per-field merge strategy hooks
//!
//! By default a field's shard values are unioned (multi-valued) or must agree
//! (single-valued). A field may instead name a [`MergeStrategy`] that decides
//! how each shard's value combines with what has been merged so far.

use crate::schema::SchemaFieldDescriptor;
use ahash::AHashMap;
use fedmerge_core::{FieldValue, MergedValue, ShardId};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

/// What a strategy decided for one shard value.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Merge the value with the built-in rules
    UseDefault,
    /// Replace the field's current merged value
    Override(MergedValue),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct StrategyError(pub String);

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Custom merge logic for a field.
pub trait MergeStrategy: Debug + Send + Sync {
    /// Combine `shard_value` from `shard` with the field's `current` value.
    fn merge(
        &self,
        field: &SchemaFieldDescriptor,
        shard: &ShardId,
        current: Option<&MergedValue>,
        shard_value: &Value,
    ) -> Result<MergeOutcome, StrategyError>;
}

/// The first shard to supply a value wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepFirst;

impl MergeStrategy for KeepFirst {
    fn merge(
        &self,
        _field: &SchemaFieldDescriptor,
        _shard: &ShardId,
        current: Option<&MergedValue>,
        _shard_value: &Value,
    ) -> Result<MergeOutcome, StrategyError> {
        Ok(match current {
            Some(value) => MergeOutcome::Override(value.clone()),
            None => MergeOutcome::UseDefault,
        })
    }
}

/// Keeps the largest numeric value any shard supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericMax;

impl MergeStrategy for NumericMax {
    fn merge(
        &self,
        field: &SchemaFieldDescriptor,
        _shard: &ShardId,
        current: Option<&MergedValue>,
        shard_value: &Value,
    ) -> Result<MergeOutcome, StrategyError> {
        numeric_extremum(field, current, shard_value, Ordering::Greater)
    }
}

/// Keeps the smallest numeric value any shard supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericMin;

impl MergeStrategy for NumericMin {
    fn merge(
        &self,
        field: &SchemaFieldDescriptor,
        _shard: &ShardId,
        current: Option<&MergedValue>,
        shard_value: &Value,
    ) -> Result<MergeOutcome, StrategyError> {
        numeric_extremum(field, current, shard_value, Ordering::Less)
    }
}

fn numeric_extremum(
    field: &SchemaFieldDescriptor,
    current: Option<&MergedValue>,
    shard_value: &Value,
    keep: Ordering,
) -> Result<MergeOutcome, StrategyError> {
    let incoming = field
        .coerce_all(shard_value)
        .map_err(|e| StrategyError::new(e.to_string()))?;
    let held: Vec<FieldValue> = match current {
        Some(MergedValue::Single(value)) => vec![value.clone()],
        Some(MergedValue::Multi(set)) => set.iter().cloned().collect(),
        None => Vec::new(),
    };

    let mut best: Option<(f64, FieldValue)> = None;
    for value in held.into_iter().chain(incoming) {
        let n = value
            .as_f64()
            .ok_or_else(|| StrategyError::new(format!("'{}' is not numeric", value)))?;
        if n.is_nan() {
            continue;
        }
        match &best {
            Some((b, _)) if n.partial_cmp(b) != Some(keep) => {}
            _ => best = Some((n, value)),
        }
    }

    Ok(match best {
        Some((_, value)) => MergeOutcome::Override(MergedValue::Single(value)),
        None => MergeOutcome::UseDefault,
    })
}

/// Named merge strategies that schema definitions can refer to.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: AHashMap<String, Arc<dyn MergeStrategy>>,
}

impl StrategyRegistry {
    /// Registry with `keep_first`, `max` and `min`
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register("keep_first", Arc::new(KeepFirst));
        registry.register("max", Arc::new(NumericMax));
        registry.register("min", Arc::new(NumericMin));
        registry
    }

    /// Register `strategy` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn MergeStrategy>) {
        self.strategies.insert(name.into(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MergeStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
