//! Sort criteria and the ranking order used to merge shard results.
//!
//! The reserved sort field [`SCORE_FIELD`] reads a document's relevance score.
//! Every other sort field reads the document's `sort_values`, which the shard
//! sends in the order the named (non-score) fields were declared.

use crate::{Error, Result, ShardDocument};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Reserved name of the relevance score, both as a sort field and as a field
pub const SCORE_FIELD: &str = "score";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(name: impl Into<String>) -> Self {
        Self { name: name.into(), direction: SortDirection::Asc }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self { name: name.into(), direction: SortDirection::Desc }
    }

    #[inline]
    pub fn is_score(&self) -> bool {
        self.name == SCORE_FIELD
    }
}

/// Ordered list of sort fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl Default for SortSpec {
    /// Relevance order: highest score first.
    fn default() -> Self {
        Self { fields: vec![SortField::desc(SCORE_FIELD)] }
    }
}

impl SortSpec {
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    /// Parse a sort clause such as `"letter asc, score desc"`.
    ///
    /// The direction defaults to ascending. A blank string yields the default
    /// relevance order.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut fields = Vec::new();
        for clause in spec.split(',') {
            let mut tokens = clause.split_whitespace();
            let name = tokens
                .next()
                .ok_or_else(|| Error::InvalidSort(format!("empty clause in '{}'", spec)))?;
            let direction = match tokens.next() {
                None => SortDirection::Asc,
                Some(d) if d.eq_ignore_ascii_case("asc") => SortDirection::Asc,
                Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                Some(d) => {
                    return Err(Error::InvalidSort(format!(
                        "unknown direction '{}' for field '{}'",
                        d, name
                    )))
                }
            };
            if let Some(extra) = tokens.next() {
                return Err(Error::InvalidSort(format!(
                    "unexpected token '{}' after '{} {}'",
                    extra, name, direction
                )));
            }
            fields.push(SortField { name: name.to_string(), direction });
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Names of the sort fields whose values shards must send, in order.
    pub fn named_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| !f.is_score()).map(|f| f.name.as_str())
    }

    /// Rank comparison: `Less` means `a` ranks better than `b`.
    ///
    /// Documents from the same shard keep that shard's order. Otherwise each
    /// sort field decides in turn, and a full tie falls back to the shard
    /// identity (smaller ranks better).
    pub fn rank_cmp(&self, a: &ShardDocument, b: &ShardDocument) -> Ordering {
        if a.shard == b.shard {
            return a.order_in_shard.cmp(&b.order_in_shard);
        }

        let mut named = 0;
        for field in &self.fields {
            let ord = if field.is_score() {
                compare_ranked(
                    a.score.map(OrderedFloat),
                    b.score.map(OrderedFloat),
                    field.direction,
                )
            } else {
                let k = named;
                named += 1;
                compare_ranked(
                    a.sort_values.get(k).and_then(|v| v.as_ref()),
                    b.sort_values.get(k).and_then(|v| v.as_ref()),
                    field.direction,
                )
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        a.shard.cmp(&b.shard)
    }

    /// Whether `a` ranks below `b` in the merged order.
    ///
    /// Same-shard documents at the same position count as ranking below, so a
    /// re-sent copy of a document displaces the one already queued.
    #[inline]
    pub fn ranks_below(&self, a: &ShardDocument, b: &ShardDocument) -> bool {
        if a.shard == b.shard {
            return a.order_in_shard >= b.order_in_shard;
        }
        self.rank_cmp(a, b) == Ordering::Greater
    }
}

// Missing values rank last whatever the direction.
fn compare_ranked<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match direction {
            SortDirection::Asc => a.cmp(&b),
            SortDirection::Desc => b.cmp(&a),
        },
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", field.name, field.direction)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for SortSpec {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<SortSpec> for String {
    fn from(spec: SortSpec) -> Self {
        spec.to_string()
    }
}
