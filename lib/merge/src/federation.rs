//! Federated merge pipeline
//!
//! Takes the responses of every shard for one query and produces the merged
//! page of results: rank all hits in one queue, keep the best copy of each
//! id, group every fragment under its winner's join key, then reduce each
//! group into a merged document.

use crate::projection::ReturnFields;
use crate::reducer::{FieldMergeReducer, MergedDocument};
use fedmerge_core::{
    Error, FederatedJoinAggregator, FieldValue, HandleCache, JoinKey, Result, ShardDocument,
    ShardId, ShardSortMergeQueue, SortSpec, SortValues,
};
use fedmerge_schema::SchemaCatalog;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One ranked hit as returned by a shard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    /// One value per named sort field, in sort order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort_values: Vec<Value>,

    /// Raw stored fields, including the unique key
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

/// A shard's complete response to one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardResponse {
    pub shard: ShardId,

    #[serde(default)]
    pub num_found: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f32>,

    /// The shard answered from an incomplete index or timed out part way
    #[serde(default)]
    pub partial_results: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,

    /// Set when the shard failed; its hits are ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Hits in the shard's own rank order
    #[serde(default)]
    pub docs: Vec<ShardHit>,
}

impl ShardResponse {
    pub fn new(shard: impl Into<ShardId>) -> Self {
        Self {
            shard: shard.into(),
            num_found: 0,
            max_score: None,
            partial_results: false,
            elapsed_ms: None,
            error: None,
            docs: Vec::new(),
        }
    }

    pub fn failed(shard: impl Into<ShardId>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(shard)
        }
    }

    /// Append a hit, counting it towards `num_found`.
    #[must_use]
    pub fn with_hit(mut self, hit: ShardHit) -> Self {
        if let Some(score) = hit.score {
            self.max_score = Some(self.max_score.map_or(score, |m| m.max(score)));
        }
        self.docs.push(hit);
        self.num_found += 1;
        self
    }
}

/// Options of one federated query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Page size
    #[serde(default = "default_rows")]
    pub rows: usize,

    /// Offset of the first returned document
    #[serde(default)]
    pub start: usize,

    #[serde(default)]
    pub sort: SortSpec,

    /// Requested field list
    #[serde(default = "default_fl")]
    pub fl: String,

    /// Field to join fragments on instead of the unique key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_field: Option<String>,

    /// Report a per-shard summary
    #[serde(default)]
    pub shards_info: bool,

    /// Report the sort values of the last returned document
    #[serde(default)]
    pub cursor: bool,
}

fn default_rows() -> usize {
    10
}

fn default_fl() -> String {
    "*".to_string()
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            start: 0,
            sort: SortSpec::default(),
            fl: default_fl(),
            join_field: None,
            shards_info: false,
            cursor: false,
        }
    }
}

impl MergeOptions {
    #[must_use]
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    #[must_use]
    pub fn with_start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn with_fl(mut self, fl: impl Into<String>) -> Self {
        self.fl = fl.into();
        self
    }

    #[must_use]
    pub fn with_join_field(mut self, field: impl Into<String>) -> Self {
        self.join_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_shards_info(mut self) -> Self {
        self.shards_info = true;
        self
    }

    #[must_use]
    pub fn with_cursor(mut self) -> Self {
        self.cursor = true;
        self
    }
}

/// Per-shard summary reported with `shards_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardInfo {
    pub num_found: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// The merged page of a federated query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedResultSet {
    /// Sum of the successful shards' match counts
    pub num_found: u64,
    pub start: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f32>,
    /// Some shard failed or answered partially
    pub partial_results: bool,
    pub docs: Vec<MergedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shards_info: Option<BTreeMap<String, ShardInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor_values: Option<Vec<Value>>,
}

/// Merges shard responses against one aggregator schema.
///
/// Reducers are built once per requested field list and kept until the
/// owner evicts them.
pub struct FederatedMerger {
    catalog: Arc<SchemaCatalog>,
    reducers: HandleCache<String, FieldMergeReducer>,
}

impl FederatedMerger {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            reducers: HandleCache::new(),
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The reducer for a requested field list.
    pub fn reducer(&self, fl: &str) -> Arc<FieldMergeReducer> {
        self.reducers.get_or_insert_with(&fl.to_string(), || {
            FieldMergeReducer::new(self.catalog.clone(), ReturnFields::parse(fl))
        })
    }

    /// Drop reducers not used within `idle`.
    pub fn evict_idle_reducers(&self, idle: Duration) -> usize {
        self.reducers.evict_idle_older_than(idle)
    }

    pub fn cached_reducers(&self) -> usize {
        self.reducers.len()
    }

    /// Merge the responses of all shards into one page.
    ///
    /// Any conversion, conflict, strategy or required-field failure aborts
    /// the whole merge. A failed shard only makes the result partial.
    pub fn merge(&self, options: &MergeOptions, responses: &[ShardResponse]) -> Result<MergedResultSet> {
        let mut num_found = 0u64;
        let mut max_score: Option<f32> = None;
        let mut partial_results = false;
        let mut shards_info = options.shards_info.then(BTreeMap::new);
        let mut fragments: Vec<Arc<ShardDocument>> = Vec::new();

        for response in responses {
            if let Some(info) = shards_info.as_mut() {
                info.insert(
                    response.shard.to_string(),
                    ShardInfo {
                        num_found: response.num_found,
                        max_score: response.max_score,
                        error: response.error.clone(),
                        elapsed_ms: response.elapsed_ms,
                    },
                );
            }

            if let Some(error) = &response.error {
                warn!("Shard {} failed, merging without it: {}", response.shard, error);
                partial_results = true;
                continue;
            }
            if response.partial_results {
                debug!("Shard {} returned partial results", response.shard);
                partial_results = true;
            }

            num_found += response.num_found;
            if let Some(score) = response.max_score {
                max_score = Some(max_score.map_or(score, |m| m.max(score)));
            }

            for (position, hit) in response.docs.iter().enumerate() {
                let doc = self.to_shard_document(&options.sort, &response.shard, position, hit)?;
                fragments.push(Arc::new(doc));
            }
        }

        let mut queue = ShardSortMergeQueue::new(options.sort.clone(), options.start.saturating_add(options.rows));
        for fragment in &fragments {
            queue.insert_with_replacement(fragment.clone());
        }
        let page: Vec<Arc<ShardDocument>> = queue.into_sorted_vec().into_iter().skip(options.start).collect();

        let aggregator = FederatedJoinAggregator::new(JoinKey::from_field(options.join_field.as_deref()));
        let groups = aggregator.group(&page, &fragments);

        let reducer = self.reducer(&options.fl);
        let docs = groups
            .iter()
            .map(|group| reducer.reduce(group))
            .collect::<Result<Vec<_>>>()?;

        let next_cursor_values = if options.cursor {
            page.last().map(|last| cursor_values(&options.sort, last))
        } else {
            None
        };

        debug!(
            "Merged {} fragments from {} shards into {} documents (found {}, partial {})",
            fragments.len(),
            responses.len(),
            docs.len(),
            num_found,
            partial_results
        );

        Ok(MergedResultSet {
            num_found,
            start: options.start,
            max_score,
            partial_results,
            docs,
            shards_info,
            next_cursor_values,
        })
    }

    fn to_shard_document(
        &self,
        sort: &SortSpec,
        shard: &ShardId,
        position: usize,
        hit: &ShardHit,
    ) -> Result<ShardDocument> {
        let key = self.catalog.unique_key();
        let id = hit
            .fields
            .get(key)
            .and_then(render_id)
            .ok_or_else(|| Error::MissingUniqueKey {
                shard: shard.to_string(),
                position,
                key: key.to_string(),
            })?;

        let mut sort_values = SortValues::new();
        for (k, name) in sort.named_fields().enumerate() {
            let raw = hit.sort_values.get(k).or_else(|| hit.fields.get(name));
            sort_values.push(match raw {
                Some(raw) => self.sort_value(name, raw)?,
                None => None,
            });
        }

        Ok(ShardDocument {
            id,
            shard: shard.clone(),
            order_in_shard: position,
            score: hit.score,
            sort_values,
            fields: hit.fields.clone(),
        })
    }

    // Sort values compare in the field's declared type when the schema knows it.
    fn sort_value(&self, name: &str, raw: &Value) -> Result<Option<FieldValue>> {
        let raw = match raw {
            Value::Array(values) => match values.first() {
                Some(first) => first,
                None => return Ok(None),
            },
            other => other,
        };
        match self.catalog.field_descriptor(name) {
            Some(descriptor) => descriptor.field_type.coerce(name, raw),
            None => Ok(FieldValue::from_json(raw)),
        }
    }
}

fn render_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(values) => values.first().and_then(render_id),
        _ => None,
    }
}

fn cursor_values(sort: &SortSpec, doc: &ShardDocument) -> Vec<Value> {
    let mut named = doc.sort_values.iter();
    sort.fields()
        .iter()
        .map(|field| {
            if field.is_score() {
                doc.score.map(Value::from).unwrap_or(Value::Null)
            } else {
                named
                    .next()
                    .and_then(|v| v.as_ref())
                    .map(FieldValue::to_json)
                    .unwrap_or(Value::Null)
            }
        })
        .collect()
}
