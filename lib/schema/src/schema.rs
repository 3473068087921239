//! Aggregator schema definitions
//!
//! The aggregator schema says, for every field a merged document can carry,
//! which type shard values are coerced into, whether the field holds one
//! value or a set, whether it must be present, whether it is returned, and
//! what to fall back to when no shard supplies it.

use crate::strategy::{MergeStrategy, StrategyRegistry};
use ahash::AHashMap;
use fedmerge_core::MergedValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Declared type of a field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Exact string
    String,
    /// Free text, merged like a string
    Text,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Single-precision float
    Float,
    /// Double-precision float
    Double,
    Boolean,
    /// Integer that turns unparseable input into NaN instead of failing
    ForgivingInt,
}

/// Merge-relevant metadata of one schema field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFieldDescriptor {
    /// Field name, or a `prefix*` / `*suffix` pattern for dynamic fields
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub multi_valued: bool,

    #[serde(default)]
    pub required: bool,

    /// Non-stored fields take part in validation but are never returned
    #[serde(default = "default_stored")]
    pub stored: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Name of a registered merge strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    /// Resolved merge strategy
    #[serde(skip)]
    pub merge_strategy: Option<Arc<dyn MergeStrategy>>,
}

fn default_stored() -> bool {
    true
}

impl SchemaFieldDescriptor {
    /// Create a stored, optional, single-valued field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            multi_valued: false,
            required: false,
            stored: true,
            default: None,
            strategy: None,
            merge_strategy: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn not_stored(mut self) -> Self {
        self.stored = false;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, name: impl Into<String>, strategy: Arc<dyn MergeStrategy>) -> Self {
        self.strategy = Some(name.into());
        self.merge_strategy = Some(strategy);
        self
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.name.contains('*')
    }

    /// The declared default, coerced into the field's type.
    pub fn default_value(&self) -> fedmerge_core::Result<Option<MergedValue>> {
        let Some(raw) = &self.default else {
            return Ok(None);
        };
        let mut values = self.coerce_all(raw)?;
        if values.is_empty() {
            return Ok(None);
        }
        if self.multi_valued {
            Ok(Some(MergedValue::multi(values)))
        } else {
            values.dedup();
            if values.len() > 1 {
                return Err(fedmerge_core::Error::FieldNotMultiValued { field: self.name.clone() });
            }
            Ok(values.pop().map(MergedValue::Single))
        }
    }
}

/// `source` values are also merged into `dest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopyField {
    /// Field name or `prefix*` / `*suffix` pattern
    pub source: String,
    pub dest: String,
}

/// Match a field name against an exact name or a single-wildcard pattern.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        true
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else {
        pattern == name
    }
}

fn is_valid_pattern(pattern: &str) -> bool {
    let stars = pattern.matches('*').count();
    stars == 1 && (pattern.starts_with('*') || pattern.ends_with('*')) && pattern.len() > 1
}

/// Serializable schema definition, as read from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default = "default_schema_name")]
    pub name: String,

    #[serde(default = "default_unique_key")]
    pub unique_key: String,

    pub fields: Vec<SchemaFieldDescriptor>,

    #[serde(default)]
    pub dynamic_fields: Vec<SchemaFieldDescriptor>,

    #[serde(default)]
    pub copy_fields: Vec<CopyField>,
}

fn default_schema_name() -> String {
    "federated".to_string()
}

fn default_unique_key() -> String {
    "id".to_string()
}

impl SchemaDefinition {
    pub fn new(unique_key: impl Into<String>) -> Self {
        Self {
            name: default_schema_name(),
            unique_key: unique_key.into(),
            fields: Vec::new(),
            dynamic_fields: Vec::new(),
            copy_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn field(mut self, field: SchemaFieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn dynamic_field(mut self, field: SchemaFieldDescriptor) -> Self {
        self.dynamic_fields.push(field);
        self
    }

    #[must_use]
    pub fn copy_field(mut self, source: impl Into<String>, dest: impl Into<String>) -> Self {
        self.copy_fields.push(CopyField { source: source.into(), dest: dest.into() });
        self
    }

    /// Validate with the built-in strategies only.
    pub fn build(self) -> Result<SchemaCatalog, SchemaError> {
        SchemaCatalog::from_definition(self, &StrategyRegistry::with_builtins())
    }
}

/// Validated, read-only view of the aggregator schema.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    name: String,
    unique_key: String,
    fields: Vec<SchemaFieldDescriptor>,
    // sorted by pattern length, longest first
    dynamic_fields: Vec<SchemaFieldDescriptor>,
    copy_fields: Vec<CopyField>,
    index: AHashMap<String, usize>,
}

impl SchemaCatalog {
    pub fn from_definition(
        definition: SchemaDefinition,
        registry: &StrategyRegistry,
    ) -> Result<Self, SchemaError> {
        if definition.fields.is_empty() {
            return Err(SchemaError::EmptySchema);
        }

        let mut fields = definition.fields;
        let mut index = AHashMap::with_capacity(fields.len());
        for (i, field) in fields.iter_mut().enumerate() {
            if field.is_dynamic() {
                return Err(SchemaError::InvalidPattern(field.name.clone()));
            }
            if index.insert(field.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
            resolve_strategy(field, registry)?;
        }

        let mut dynamic_fields = definition.dynamic_fields;
        for field in dynamic_fields.iter_mut() {
            if !is_valid_pattern(&field.name) {
                return Err(SchemaError::InvalidPattern(field.name.clone()));
            }
            resolve_strategy(field, registry)?;
        }
        dynamic_fields.sort_by(|a, b| b.name.len().cmp(&a.name.len()));

        let catalog = Self {
            name: definition.name,
            unique_key: definition.unique_key,
            fields,
            dynamic_fields,
            copy_fields: definition.copy_fields,
            index,
        };

        if !catalog.index.contains_key(&catalog.unique_key) {
            return Err(SchemaError::UnknownUniqueKey(catalog.unique_key.clone()));
        }

        for copy in &catalog.copy_fields {
            if copy.source.contains('*') && !is_valid_pattern(&copy.source) {
                return Err(SchemaError::InvalidPattern(copy.source.clone()));
            }
            if catalog.field_descriptor(&copy.dest).is_none() {
                return Err(SchemaError::UnknownCopyDestination {
                    from: copy.source.clone(),
                    dest: copy.dest.clone(),
                });
            }
        }

        for field in catalog.fields.iter().chain(catalog.dynamic_fields.iter()) {
            field.default_value().map_err(|e| SchemaError::InvalidDefault {
                field: field.name.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(catalog)
    }

    pub fn from_json(json: &str, registry: &StrategyRegistry) -> Result<Self, SchemaError> {
        let definition: SchemaDefinition =
            serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::from_definition(definition, registry)
    }

    pub fn load<P: AsRef<Path>>(path: P, registry: &StrategyRegistry) -> Result<Self, SchemaError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SchemaError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&json, registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    /// Descriptor of a declared field, or of the most specific matching
    /// dynamic field.
    pub fn field_descriptor(&self, name: &str) -> Option<&SchemaFieldDescriptor> {
        if let Some(&i) = self.index.get(name) {
            return Some(&self.fields[i]);
        }
        self.dynamic_fields.iter().find(|f| pattern_matches(&f.name, name))
    }

    /// Declared fields, in declaration order
    pub fn list_fields(&self) -> impl Iterator<Item = &SchemaFieldDescriptor> {
        self.fields.iter()
    }

    pub fn dynamic_fields(&self) -> impl Iterator<Item = &SchemaFieldDescriptor> {
        self.dynamic_fields.iter()
    }

    /// Destinations that values of `source` are copied into, with the
    /// descriptor each destination resolves to.
    pub fn copy_destinations<'a>(
        &'a self,
        source: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a SchemaFieldDescriptor)> + 'a {
        self.copy_fields
            .iter()
            .filter(move |c| pattern_matches(&c.source, source))
            .filter_map(move |c| self.field_descriptor(&c.dest).map(|d| (c.dest.as_str(), d)))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn resolve_strategy(
    field: &mut SchemaFieldDescriptor,
    registry: &StrategyRegistry,
) -> Result<(), SchemaError> {
    if field.merge_strategy.is_some() {
        return Ok(());
    }
    if let Some(name) = &field.strategy {
        let strategy = registry.get(name).ok_or_else(|| SchemaError::UnknownStrategy {
            field: field.name.clone(),
            strategy: name.clone(),
        })?;
        field.merge_strategy = Some(strategy);
    }
    Ok(())
}

/// Errors that can occur while loading or validating a schema
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema declares no fields")]
    EmptySchema,

    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("Unique key field '{0}' is not declared")]
    UnknownUniqueKey(String),

    #[error("Invalid field pattern '{0}'")]
    InvalidPattern(String),

    #[error("Copy field from '{from}' targets undeclared field '{dest}'")]
    UnknownCopyDestination { from: String, dest: String },

    #[error("Field '{field}' uses unknown merge strategy '{strategy}'")]
    UnknownStrategy { field: String, strategy: String },

    #[error("Field '{field}' has an invalid default: {reason}")]
    InvalidDefault { field: String, reason: String },

    #[error("Cannot read schema: {0}")]
    Io(String),

    #[error("Cannot parse schema: {0}")]
    Parse(String),
}
