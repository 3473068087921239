//! # fedmerge Schema
//!
//! The aggregator schema a federated merge is driven by.
//!
//! ## Overview
//!
//! Each shard indexes its part of a document with its own local schema. The
//! aggregator schema is the single view the merged documents conform to:
//!
//! - [`SchemaFieldDescriptor`] - type, multi-valued, required, stored, default
//! - [`SchemaCatalog`] - declared fields, dynamic field patterns, copy fields
//! - [`MergeStrategy`] - optional per-field hook replacing the built-in rules
//!
//! ## Schema Definition
//!
//! ```rust
//! use fedmerge_schema::{FieldType, SchemaDefinition, SchemaFieldDescriptor};
//! use serde_json::json;
//!
//! let catalog = SchemaDefinition::new("id")
//!     .field(SchemaFieldDescriptor::string("id").required())
//!     .field(SchemaFieldDescriptor::string("letter").multi_valued())
//!     .field(SchemaFieldDescriptor::new("number", FieldType::Int))
//!     .field(SchemaFieldDescriptor::string("status").with_default(json!("draft")))
//!     .dynamic_field(SchemaFieldDescriptor::string("*_s"))
//!     .copy_field("letter", "text_s")
//!     .build()
//!     .unwrap();
//!
//! assert!(catalog.field_descriptor("letter").unwrap().multi_valued);
//! assert_eq!(catalog.field_descriptor("text_s").unwrap().name, "*_s");
//! ```
//!
//! ## Value Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ shard value │────>│  strategy?  │────>│   coerce    │
//! │   (JSON)    │     │   (hook)    │     │ (FieldType) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            │            ┌──────┴──────┐
//!                            └───────────>│ MergedValue │
//!                                         └─────────────┘
//! ```

pub mod convert;
pub mod schema;
pub mod strategy;

pub use schema::{
    pattern_matches, CopyField, FieldType, SchemaCatalog, SchemaDefinition, SchemaError,
    SchemaFieldDescriptor,
};
pub use strategy::{
    KeepFirst, MergeOutcome, MergeStrategy, NumericMax, NumericMin, StrategyError,
    StrategyRegistry,
};
