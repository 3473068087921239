//! # fedmerge Core
//!
//! Core library for the fedmerge federated search merge engine.
//!
//! A logical document may be split field-by-field across several shards. This
//! crate provides the pieces that bring the shards' ranked results back into
//! one order:
//!
//! - [`ShardDocument`] - One shard's fragment of a document
//! - [`SortSpec`] - Sort criteria and the cross-shard ranking order
//! - [`ShardSortMergeQueue`] - Bounded k-way merge with per-id replacement
//! - [`FederatedJoinAggregator`] - Groups fragments by join key
//! - [`HandleCache`] - Caller-owned cache of lazily built handles
//!
//! ## Example
//!
//! ```rust
//! use fedmerge_core::{FederatedJoinAggregator, FieldValue, ShardDocument, ShardSortMergeQueue, SortSpec};
//! use std::sync::Arc;
//!
//! let sort = SortSpec::parse("letter asc").unwrap();
//! let docs: Vec<Arc<ShardDocument>> = vec![
//!     Arc::new(ShardDocument::new("1", "shard1", 0).with_sort_values([Some(FieldValue::from("D"))])),
//!     Arc::new(ShardDocument::new("1", "shard2", 0).with_sort_values([Some(FieldValue::from("A"))])),
//!     Arc::new(ShardDocument::new("2", "shard2", 1).with_sort_values([Some(FieldValue::from("B"))])),
//! ];
//!
//! let mut queue = ShardSortMergeQueue::new(sort, 10);
//! for doc in &docs {
//!     queue.insert_with_replacement(doc.clone());
//! }
//! let ranked = queue.into_sorted_vec();
//! assert_eq!(ranked.len(), 2);
//!
//! let groups = FederatedJoinAggregator::default().group(&ranked, &docs);
//! assert_eq!(groups[0].join_key, "1");
//! assert_eq!(groups[0].members.len(), 2);
//! ```

pub mod cache;
pub mod document;
pub mod error;
pub mod join;
pub mod queue;
pub mod sort;
pub mod value;

pub use cache::HandleCache;
pub use document::{ShardDocument, ShardId, SortValues};
pub use error::{Error, Result};
pub use join::{FederatedJoinAggregator, JoinGroup, JoinKey};
pub use queue::ShardSortMergeQueue;
pub use sort::{SortDirection, SortField, SortSpec, SCORE_FIELD};
pub use value::{FieldValue, MergedValue};
