//! # fedmerge Merge
//!
//! Reduces federated shard results into merged documents.
//!
//! This crate drives the core ranking and grouping primitives with an
//! aggregator schema:
//!
//! - [`ReturnFields`] - Parsed field list of a query
//! - [`FieldMergeReducer`] - Folds a join group into a [`MergedDocument`]
//! - [`FederatedMerger`] - The full pipeline from shard responses to a page
//!
//! ## Example
//!
//! ```rust
//! use fedmerge_merge::{FederatedMerger, MergeOptions, ShardHit, ShardResponse};
//! use fedmerge_schema::{SchemaDefinition, SchemaFieldDescriptor};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let catalog = SchemaDefinition::new("id")
//!     .field(SchemaFieldDescriptor::string("id"))
//!     .field(SchemaFieldDescriptor::string("tag").multi_valued())
//!     .build()
//!     .unwrap();
//!
//! let hit = |tag: &str| ShardHit {
//!     score: Some(1.0),
//!     fields: [("id".to_string(), json!("1")), ("tag".to_string(), json!(tag))].into(),
//!     ..Default::default()
//! };
//! let responses = vec![
//!     ShardResponse::new("shard1").with_hit(hit("red")),
//!     ShardResponse::new("shard2").with_hit(hit("blue")),
//! ];
//!
//! let merger = FederatedMerger::new(Arc::new(catalog));
//! let result = merger.merge(&MergeOptions::default(), &responses).unwrap();
//! assert_eq!(result.docs.len(), 1);
//! assert_eq!(result.docs[0].get("tag").unwrap().len(), 2);
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Shard     │────>│ Sort-merge  │────>│    Join     │
//! │  responses  │     │   queue     │     │ aggregator  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                         ┌──────┴──────┐
//!                                         │   Field     │
//!                                         │  reducer    │
//!                                         └─────────────┘
//! ```

pub mod federation;
pub mod projection;
pub mod reducer;

pub use federation::{
    FederatedMerger, MergeOptions, MergedResultSet, ShardHit, ShardInfo, ShardResponse,
};
pub use projection::{ReturnFields, FRAGMENT_IDS_FIELD, SHARD_FIELD, VERSION_FIELD};
pub use reducer::{FieldMergeReducer, MergedDocument, ShardProvenance};
