//! # fedmerge
//!
//! A merge engine for federated search.
//!
//! When one logical document is split field-by-field across several shards,
//! every shard returns its own ranked fragment. fedmerge turns those shard
//! responses back into one ranked page of whole documents.
//!
//! ## Quick Start
//!
//! ### From the Command Line
//!
//! ```bash
//! fedmerge --schema schema.json --responses shards.json --sort "letter asc" --fl "*,[shard]"
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use fedmerge::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let catalog = SchemaCatalog::from_json(
//!     r#"{"fields": [
//!         {"name": "id", "type": "string", "required": true},
//!         {"name": "letter", "type": "string", "multi_valued": true}
//!     ]}"#,
//!     &StrategyRegistry::with_builtins(),
//! )
//! .unwrap();
//!
//! let responses: Vec<ShardResponse> = serde_json::from_value(json!([
//!     {"shard": "shard1", "num_found": 1, "docs": [{"fields": {"id": "1", "letter": "D"}}]},
//!     {"shard": "shard2", "num_found": 1, "docs": [{"fields": {"id": "1", "letter": "A"}}]}
//! ]))
//! .unwrap();
//!
//! let options = MergeOptions::default().with_sort(SortSpec::parse("letter asc").unwrap());
//! let merger = FederatedMerger::new(Arc::new(catalog));
//! let result = merger.merge(&options, &responses).unwrap();
//!
//! assert_eq!(result.num_found, 2);
//! assert_eq!(result.docs[0].get("letter").unwrap().len(), 2);
//! ```
//!
//! ## Crate Structure
//!
//! fedmerge is composed of several crates:
//!
//! - [`fedmerge-core`](fedmerge_core) - Shard documents, sorting, the sort-merge queue, join grouping
//! - [`fedmerge-schema`](fedmerge_schema) - Aggregator schema, value coercion, merge strategies
//! - [`fedmerge-merge`](fedmerge_merge) - Field reducer and the federated merge pipeline
//!
//! ## Features
//!
//! - **Identity-aware k-way merge**: one copy per document id, the best ranked
//! - **Join grouping**: fragments joined on the unique key or any field
//! - **Schema-driven reconciliation**: multi-valued union, single-valued
//!   conflict detection, defaults, required and non-stored fields, copy fields
//! - **Merge strategy hooks**: per-field overrides of the built-in rules

// Re-export core types
pub use fedmerge_core::{
    Error, FederatedJoinAggregator, FieldValue, HandleCache, JoinGroup, JoinKey, MergedValue,
    Result, ShardDocument, ShardId, ShardSortMergeQueue, SortDirection, SortField, SortSpec,
};

// Re-export schema
pub use fedmerge_schema::{
    FieldType, MergeOutcome, MergeStrategy, SchemaCatalog, SchemaDefinition, SchemaError,
    SchemaFieldDescriptor, StrategyError, StrategyRegistry,
};

// Re-export merge pipeline
pub use fedmerge_merge::{
    FederatedMerger, FieldMergeReducer, MergeOptions, MergedDocument, MergedResultSet,
    ReturnFields, ShardHit, ShardInfo, ShardProvenance, ShardResponse,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Error, Result,
        FieldValue, MergedValue, ShardDocument, ShardId, SortSpec,
        ShardSortMergeQueue, FederatedJoinAggregator, JoinKey,
        SchemaCatalog, SchemaDefinition, SchemaFieldDescriptor, FieldType, StrategyRegistry,
        MergeOptions, FederatedMerger, MergedResultSet, ShardHit, ShardResponse,
    };
}
