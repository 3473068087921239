//! Grouping of shard fragments into logical documents.

use crate::ShardDocument;
use ahash::AHashMap;
use serde_json::Value;
use std::sync::Arc;

/// How fragments from different shards are recognised as the same document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JoinKey {
    /// Join on the document id
    #[default]
    Id,
    /// Join on the value of a field, falling back to the id when absent
    Field(String),
}

impl JoinKey {
    pub fn from_field(field: Option<&str>) -> Self {
        match field {
            Some(name) if !name.is_empty() => JoinKey::Field(name.to_string()),
            _ => JoinKey::Id,
        }
    }

    pub fn key_of(&self, doc: &ShardDocument) -> String {
        match self {
            JoinKey::Id => doc.id.clone(),
            JoinKey::Field(name) => doc
                .field(name)
                .and_then(render_key)
                .unwrap_or_else(|| doc.id.clone()),
        }
    }
}

fn render_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(values) => values.first().and_then(render_key),
        Value::Null | Value::Object(_) => None,
    }
}

/// All fragments of one logical document.
#[derive(Debug, Clone)]
pub struct JoinGroup {
    pub join_key: String,
    /// What `join_key` was taken from
    pub joined_on: JoinKey,
    /// Fragments in shard arrival order
    pub members: Vec<Arc<ShardDocument>>,
}

impl JoinGroup {
    pub fn new(join_key: impl Into<String>) -> Self {
        Self {
            join_key: join_key.into(),
            joined_on: JoinKey::Id,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn joined_on(mut self, joined_on: JoinKey) -> Self {
        self.joined_on = joined_on;
        self
    }

    /// Whether members were joined on something other than the unique key.
    ///
    /// Members of such a group may carry different ids.
    pub fn joined_on_other_than(&self, unique_key: &str) -> bool {
        match &self.joined_on {
            JoinKey::Id => false,
            JoinKey::Field(name) => name != unique_key,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FederatedJoinAggregator {
    join_key: JoinKey,
}

impl FederatedJoinAggregator {
    pub fn new(join_key: JoinKey) -> Self {
        Self { join_key }
    }

    pub fn join_key(&self) -> &JoinKey {
        &self.join_key
    }

    /// Group `fragments` under the join keys of the `ranked` winners.
    ///
    /// Groups come out in the rank order of their best winner. Fragments are
    /// appended in the order given; those whose key has no winner are dropped.
    pub fn group<'a, I>(&self, ranked: &[Arc<ShardDocument>], fragments: I) -> Vec<JoinGroup>
    where
        I: IntoIterator<Item = &'a Arc<ShardDocument>>,
    {
        let mut groups: Vec<JoinGroup> = Vec::new();
        let mut index: AHashMap<String, usize> = AHashMap::with_capacity(ranked.len());

        for winner in ranked {
            let key = self.join_key.key_of(winner);
            if !index.contains_key(&key) {
                index.insert(key.clone(), groups.len());
                groups.push(JoinGroup::new(key).joined_on(self.join_key.clone()));
            }
        }

        for fragment in fragments {
            let key = self.join_key.key_of(fragment);
            if let Some(&slot) = index.get(&key) {
                let group = &mut groups[slot];
                if !group.members.iter().any(|m| Arc::ptr_eq(m, fragment)) {
                    group.members.push(fragment.clone());
                }
            }
        }

        groups
    }
}
