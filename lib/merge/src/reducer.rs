//! Field-by-field reduction of a join group into one merged document
//!
//! Every member of a group is folded in shard arrival order. Multi-valued
//! fields accumulate the union of all shard values. Single-valued fields must
//! agree across shards. A field with a merge strategy lets the strategy decide
//! first. Once all members are in, defaults are applied, required fields are
//! checked, and non-stored or unrequested fields are dropped.
//!
//! When a group was joined on a field other than the unique key its members
//! carry different ids. The unique key is then not merged; each fragment's
//! identity is reported through the `[djoin]` pseudo-field instead.

use crate::projection::{ReturnFields, FRAGMENT_IDS_FIELD, SHARD_FIELD, VERSION_FIELD};
use fedmerge_core::{Error, JoinGroup, MergedValue, Result, ShardDocument, ShardId, SCORE_FIELD};
use fedmerge_schema::{MergeOutcome, SchemaCatalog, SchemaFieldDescriptor};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

/// One shard that contributed to a merged document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardProvenance {
    pub shard: ShardId,
    /// The shard's own score, present only when scores were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// A logical document assembled from all of its shard fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedDocument {
    #[serde(flatten)]
    pub fields: BTreeMap<String, MergedValue>,

    #[serde(rename = "[shard]", skip_serializing_if = "Option::is_none")]
    pub shard_provenance: Option<Vec<ShardProvenance>>,

    /// `shard:id[:version]` of every member, in arrival order
    #[serde(rename = "[djoin]", skip_serializing_if = "Option::is_none")]
    pub fragment_ids: Option<Vec<String>>,

    /// Highest score of any member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl MergedDocument {
    #[inline]
    pub fn get(&self, field: &str) -> Option<&MergedValue> {
        self.fields.get(field)
    }

    #[inline]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reduces join groups for one schema and one requested field list.
#[derive(Debug, Clone)]
pub struct FieldMergeReducer {
    catalog: Arc<SchemaCatalog>,
    return_fields: ReturnFields,
}

impl FieldMergeReducer {
    pub fn new(catalog: Arc<SchemaCatalog>, return_fields: ReturnFields) -> Self {
        Self { catalog, return_fields }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn return_fields(&self) -> &ReturnFields {
        &self.return_fields
    }

    /// Merge every member of `group` into one document.
    ///
    /// Fails on the first field that cannot be converted, that receives
    /// conflicting single values, whose strategy fails, or that is required
    /// and requested but ends up without a value.
    pub fn reduce(&self, group: &JoinGroup) -> Result<MergedDocument> {
        let wants_score = self.return_fields.wants_score();
        let mut fields: BTreeMap<String, MergedValue> = BTreeMap::new();
        let mut provenance = self.return_fields.wants_shard_info().then(Vec::new);
        let mut fragment_ids = self.return_fields.wants_fragment_ids().then(Vec::new);
        let mut score: Option<f32> = None;

        let unique_key = self.catalog.unique_key();
        let split_identity = group.joined_on_other_than(unique_key);

        for member in &group.members {
            if let Some(s) = member.score {
                score = Some(score.map_or(s, |best| best.max(s)));
            }

            if let Some(shards) = provenance.as_mut() {
                if !shards.iter().any(|p: &ShardProvenance| p.shard == member.shard) {
                    shards.push(ShardProvenance {
                        shard: member.shard.clone(),
                        score: if wants_score { member.score } else { None },
                    });
                }
            }

            if let Some(ids) = fragment_ids.as_mut() {
                let id = fragment_id(member);
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }

            for (name, raw) in &member.fields {
                if name == SCORE_FIELD || name == SHARD_FIELD || name == FRAGMENT_IDS_FIELD {
                    continue;
                }
                // fields unknown to the aggregator schema are dropped
                if let Some(descriptor) = self.catalog.field_descriptor(name) {
                    if !(split_identity && name == unique_key) {
                        merge_value(&mut fields, name, descriptor, &member.shard, raw)?;
                    }
                }
                for (dest, descriptor) in self.catalog.copy_destinations(name) {
                    merge_value(&mut fields, dest, descriptor, &member.shard, raw)?;
                }
            }
        }

        for descriptor in self.catalog.list_fields() {
            if !fields.contains_key(&descriptor.name) {
                if let Some(default) = descriptor.default_value()? {
                    fields.insert(descriptor.name.clone(), default);
                }
            }
            if descriptor.required
                && !(split_identity && descriptor.name == unique_key)
                && !fields.contains_key(&descriptor.name)
                && self.return_fields.wants_field(&descriptor.name)
            {
                return Err(Error::MissingRequiredField {
                    field: descriptor.name.clone(),
                });
            }
        }

        let catalog = &self.catalog;
        let return_fields = &self.return_fields;
        fields.retain(|name, _| {
            catalog.field_descriptor(name).is_some_and(|d| d.stored) && return_fields.wants_field(name)
        });

        trace!(
            "Reduced join group {} from {} fragments into {} fields",
            group.join_key,
            group.len(),
            fields.len()
        );

        Ok(MergedDocument {
            fields,
            shard_provenance: provenance,
            fragment_ids,
            score: if wants_score { score } else { None },
        })
    }
}

fn fragment_id(member: &ShardDocument) -> String {
    let version = member.field(VERSION_FIELD).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    match version {
        Some(version) => format!("{}:{}:{}", member.shard, member.id, version),
        None => format!("{}:{}", member.shard, member.id),
    }
}

fn merge_value(
    fields: &mut BTreeMap<String, MergedValue>,
    name: &str,
    descriptor: &SchemaFieldDescriptor,
    shard: &ShardId,
    raw: &Value,
) -> Result<()> {
    if let Some(strategy) = &descriptor.merge_strategy {
        let outcome = strategy
            .merge(descriptor, shard, fields.get(name), raw)
            .map_err(|e| Error::MergeStrategy {
                field: name.to_string(),
                message: e.0,
            })?;
        if let MergeOutcome::Override(value) = outcome {
            fields.insert(name.to_string(), value);
            return Ok(());
        }
    }

    let values = descriptor.field_type.coerce_all(name, raw)?;
    if values.is_empty() {
        return Ok(());
    }

    if descriptor.multi_valued {
        let merged = match fields.remove(name) {
            Some(existing) => {
                let mut set = existing.into_set();
                set.extend(values);
                set
            }
            None => values.into_iter().collect(),
        };
        fields.insert(name.to_string(), MergedValue::Multi(merged));
        return Ok(());
    }

    let mut distinct: BTreeSet<_> = values.into_iter().collect();
    if let Some(current) = fields.get(name) {
        distinct.extend(current.clone().into_set());
    }
    if distinct.len() > 1 {
        return Err(Error::FieldNotMultiValued {
            field: name.to_string(),
        });
    }
    if let Some(value) = distinct.pop_first() {
        fields.insert(name.to_string(), MergedValue::Single(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedmerge_core::{FieldValue, JoinKey};
    use fedmerge_schema::{FieldType, KeepFirst, NumericMax, SchemaDefinition};
    use serde_json::json;

    fn catalog() -> Arc<SchemaCatalog> {
        Arc::new(
            SchemaDefinition::new("id")
                .field(SchemaFieldDescriptor::string("id").required())
                .field(SchemaFieldDescriptor::string("letter").multi_valued())
                .field(SchemaFieldDescriptor::string("single"))
                .field(SchemaFieldDescriptor::string("copy"))
                .field(SchemaFieldDescriptor::string("multicopy").multi_valued())
                .field(SchemaFieldDescriptor::string("required").required().not_stored())
                .field(SchemaFieldDescriptor::string("default").with_default(json!("foo")))
                .field(SchemaFieldDescriptor::string("status").required().with_default(json!("draft")))
                .field(SchemaFieldDescriptor::new("number", FieldType::Int))
                .field(SchemaFieldDescriptor::string("title").with_strategy("keep_first", Arc::new(KeepFirst)))
                .field(SchemaFieldDescriptor::new("price", FieldType::Double).with_strategy("max", Arc::new(NumericMax)))
                .dynamic_field(SchemaFieldDescriptor::string("xyz*"))
                .copy_field("single", "copy")
                .copy_field("single", "multicopy")
                .copy_field("letter", "multicopy")
                .build()
                .unwrap(),
        )
    }

    fn reducer(fl: &str) -> FieldMergeReducer {
        FieldMergeReducer::new(catalog(), ReturnFields::parse(fl))
    }

    fn group(members: Vec<ShardDocument>) -> JoinGroup {
        let mut group = JoinGroup::new(members[0].id.clone());
        group.members = members.into_iter().map(Arc::new).collect();
        group
    }

    fn fragment(shard: &str, fields: Value) -> ShardDocument {
        let mut doc = ShardDocument::new("1", shard, 0).with_field("id", json!("1")).with_field("required", json!("_"));
        if let Value::Object(map) = fields {
            for (k, v) in map {
                doc = doc.with_field(k, v);
            }
        }
        doc
    }

    fn strings(values: &[&str]) -> MergedValue {
        MergedValue::multi(values.iter().map(|v| FieldValue::from(*v)))
    }

    #[test]
    fn test_multi_valued_union() {
        let g = group(vec![
            fragment("shard1", json!({"letter": ["x", "y"]})),
            fragment("shard2", json!({"letter": ["y", "z"]})),
        ]);
        let doc = reducer("*").reduce(&g).unwrap();
        assert_eq!(doc.get("letter"), Some(&strings(&["x", "y", "z"])));
    }

    #[test]
    fn test_single_valued_agreement_and_conflict() {
        let agree = group(vec![
            fragment("shard1", json!({"single": "foo"})),
            fragment("shard2", json!({"single": "foo"})),
        ]);
        let doc = reducer("*").reduce(&agree).unwrap();
        assert_eq!(doc.get("single"), Some(&MergedValue::Single("foo".into())));

        let conflict = group(vec![
            fragment("shard1", json!({"single": "foo"})),
            fragment("shard2", json!({"single": "bar"})),
        ]);
        let err = reducer("single").reduce(&conflict).unwrap_err();
        assert!(matches!(err, Error::FieldNotMultiValued { ref field } if field == "single"));
    }

    #[test]
    fn test_conflict_names_source_before_copy_destination() {
        // "single" is copied into single-valued "copy"; both would conflict
        let conflict = group(vec![
            fragment("shard1", json!({"single": "foo"})),
            fragment("shard4", json!({"single": "bar"})),
        ]);
        for fl in ["*", "copy", "id"] {
            let err = reducer(fl).reduce(&conflict).unwrap_err();
            assert_eq!(err.field(), Some("single"), "fl={}", fl);
        }
    }

    #[test]
    fn test_single_value_array_is_conflict() {
        let g = group(vec![fragment("shard1", json!({"single": ["a", "b"]}))]);
        assert!(matches!(reducer("*").reduce(&g), Err(Error::FieldNotMultiValued { .. })));
    }

    #[test]
    fn test_coerced_equality() {
        let g = group(vec![
            fragment("shard1", json!({"number": "7"})),
            fragment("shard2", json!({"number": 7})),
        ]);
        let doc = reducer("number").reduce(&g).unwrap();
        assert_eq!(doc.get("number"), Some(&MergedValue::Single(FieldValue::Int(7))));
    }

    #[test]
    fn test_conversion_failure_is_fatal() {
        let g = group(vec![fragment("shard1", json!({"number": "NaN"}))]);
        let err = reducer("*").reduce(&g).unwrap_err();
        assert_eq!(err.field(), Some("number"));
    }

    #[test]
    fn test_copy_fields() {
        let g = group(vec![
            fragment("shard1", json!({"letter": "D", "single": "x"})),
            fragment("shard2", json!({"letter": "A"})),
        ]);
        let doc = reducer("*").reduce(&g).unwrap();
        assert_eq!(doc.get("copy"), Some(&MergedValue::Single("x".into())));
        assert_eq!(doc.get("multicopy"), Some(&strings(&["A", "D", "x"])));
    }

    #[test]
    fn test_unknown_fields_ignored_dynamic_kept() {
        let g = group(vec![fragment("shard1", json!({"ignore": "_", "xyzzy": "plugh"}))]);
        let doc = reducer("*").reduce(&g).unwrap();
        assert!(!doc.contains("ignore"));
        assert_eq!(doc.get("xyzzy"), Some(&MergedValue::Single("plugh".into())));
    }

    #[test]
    fn test_required_only_when_requested() {
        let bare = ShardDocument::new("1", "shard1", 0).with_field("id", json!("1"));
        let g = group(vec![bare]);

        let err = reducer("*").reduce(&g).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { ref field } if field == "required"));
        let err = reducer("required").reduce(&g).unwrap_err();
        assert_eq!(err.field(), Some("required"));

        assert!(reducer("id,letter").reduce(&g).is_ok());
    }

    #[test]
    fn test_required_from_one_shard_and_not_stored() {
        let g = group(vec![
            fragment("shard1", json!({})),
            ShardDocument::new("1", "shard2", 0).with_field("letter", json!("Q")),
        ]);
        let doc = reducer("*").reduce(&g).unwrap();
        // checked, but never returned
        assert!(!doc.contains("required"));
        assert!(doc.contains("letter"));
    }

    #[test]
    fn test_required_from_one_of_three_shards() {
        let g = group(vec![
            ShardDocument::new("1", "shard1", 0).with_field("id", json!("1")).with_field("letter", json!("A")),
            fragment("shard2", json!({})),
            ShardDocument::new("1", "shard3", 0).with_field("id", json!("1")).with_field("letter", json!("B")),
        ]);
        let doc = reducer("*").reduce(&g).unwrap();
        assert!(!doc.contains("required"));
        assert_eq!(doc.get("letter"), Some(&strings(&["A", "B"])));

        let without = group(vec![
            ShardDocument::new("1", "shard1", 0).with_field("id", json!("1")),
            ShardDocument::new("1", "shard3", 0).with_field("id", json!("1")),
        ]);
        assert_eq!(reducer("*").reduce(&without).unwrap_err().field(), Some("required"));
    }

    #[test]
    fn test_required_field_with_default_never_missing() {
        let g = group(vec![fragment("shard1", json!({}))]);
        let doc = reducer("status").reduce(&g).unwrap();
        assert_eq!(doc.get("status"), Some(&MergedValue::Single("draft".into())));

        let doc = reducer("*").reduce(&g).unwrap();
        assert_eq!(doc.get("status"), Some(&MergedValue::Single("draft".into())));
    }

    #[test]
    fn test_join_on_field_keeps_fragment_ids() {
        let mut g = JoinGroup::new("P1").joined_on(JoinKey::Field("accession".to_string()));
        g.members = vec![
            Arc::new(
                ShardDocument::new("a1", "a", 0)
                    .with_field("id", json!("a1"))
                    .with_field("required", json!("_"))
                    .with_field("letter", json!("X")),
            ),
            Arc::new(
                ShardDocument::new("b1", "b", 3)
                    .with_field("id", json!("b1"))
                    .with_field("letter", json!("Y"))
                    .with_field("_version_", json!(1234567)),
            ),
        ];

        // differing ids do not conflict and the unique key is not required
        let doc = reducer("*").reduce(&g).unwrap();
        assert!(!doc.contains("id"));
        assert_eq!(doc.get("letter"), Some(&strings(&["X", "Y"])));
        assert!(doc.fragment_ids.is_none());

        let doc = reducer("letter,[djoin]").reduce(&g).unwrap();
        assert_eq!(
            doc.fragment_ids,
            Some(vec!["a:a1".to_string(), "b:b1:1234567".to_string()])
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["[djoin]"], json!(["a:a1", "b:b1:1234567"]));

        // the same members joined on the id still disagree
        let mut by_id = g.clone();
        by_id.joined_on = JoinKey::Id;
        assert_eq!(reducer("*").reduce(&by_id).unwrap_err().field(), Some("id"));
    }

    #[test]
    fn test_default_value() {
        let doc = reducer("default").reduce(&group(vec![fragment("shard1", json!({}))])).unwrap();
        assert_eq!(doc.get("default"), Some(&MergedValue::Single("foo".into())));
        assert_eq!(doc.len(), 1);

        let doc = reducer("default")
            .reduce(&group(vec![fragment("shard1", json!({"default": "xxx"}))]))
            .unwrap();
        assert_eq!(doc.get("default"), Some(&MergedValue::Single("xxx".into())));
    }

    #[test]
    fn test_score_and_provenance() {
        let g = group(vec![
            fragment("shard1", json!({})).with_score(0.5),
            fragment("shard2", json!({})).with_score(1.5),
            fragment("shard3", json!({})),
        ]);

        let doc = reducer("*").reduce(&g).unwrap();
        assert!(doc.score.is_none());
        assert!(doc.shard_provenance.is_none());

        let doc = reducer("*,[shard]").reduce(&g).unwrap();
        let shards = doc.shard_provenance.unwrap();
        assert_eq!(shards.len(), 3);
        assert!(shards.iter().all(|p| p.score.is_none()));

        let doc = reducer("*,[shard],score").reduce(&g).unwrap();
        assert_eq!(doc.score, Some(1.5));
        let shards = doc.shard_provenance.unwrap();
        assert_eq!(shards[0], ShardProvenance { shard: ShardId::new("shard1"), score: Some(0.5) });
        assert_eq!(shards[2].score, None);
    }

    #[test]
    fn test_strategies() {
        let g = group(vec![
            fragment("shard1", json!({"title": "first", "price": "9.5"})),
            fragment("shard2", json!({"title": "second", "price": 12})),
            fragment("shard3", json!({"title": "third", "price": [3, 4]})),
        ]);
        let doc = reducer("title,price").reduce(&g).unwrap();
        assert_eq!(doc.get("title"), Some(&MergedValue::Single("first".into())));
        assert_eq!(doc.get("price"), Some(&MergedValue::Single(FieldValue::float(12.0))));
    }

    #[test]
    fn test_strategy_failure_names_field() {
        let g = group(vec![fragment("shard1", json!({"price": "cheap"}))]);
        let err = reducer("*").reduce(&g).unwrap_err();
        assert!(matches!(err, Error::MergeStrategy { ref field, .. } if field == "price"));
    }

    #[test]
    fn test_serialized_shape() {
        let g = group(vec![fragment("shard1", json!({"letter": ["B", "A"]})).with_score(2.0)]);
        let doc = reducer("id,letter,[shard],score").reduce(&g).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "1",
                "letter": ["A", "B"],
                "[shard]": [{"shard": "shard1", "score": 2.0}],
                "score": 2.0
            })
        );
    }
}
