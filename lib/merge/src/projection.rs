//! Requested field list (`fl`) handling.

use fedmerge_core::SCORE_FIELD;
use fedmerge_schema::pattern_matches;

/// Pseudo-field carrying per-shard provenance of a merged document
pub const SHARD_FIELD: &str = "[shard]";

/// Pseudo-field listing every fragment of a merged document as
/// `shard:id` or `shard:id:version`
pub const FRAGMENT_IDS_FIELD: &str = "[djoin]";

/// Per-fragment version reported by shards
pub const VERSION_FIELD: &str = "_version_";

/// Parsed field list of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnFields {
    all: bool,
    shard_info: bool,
    fragment_ids: bool,
    score: bool,
    // exact names or globs
    patterns: Vec<String>,
}

impl Default for ReturnFields {
    fn default() -> Self {
        Self::parse("")
    }
}

impl ReturnFields {
    /// Parse a field list such as `"*,[shard],score"` or `"id letter"`.
    ///
    /// Tokens are separated by commas or whitespace. A list naming no field at
    /// all is treated as `*`.
    pub fn parse(fl: &str) -> Self {
        let mut fields = Self {
            all: false,
            shard_info: false,
            fragment_ids: false,
            score: false,
            patterns: Vec::new(),
        };

        let tokens = fl
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty());
        for token in tokens {
            match token {
                "*" => fields.all = true,
                SHARD_FIELD => fields.shard_info = true,
                FRAGMENT_IDS_FIELD => fields.fragment_ids = true,
                SCORE_FIELD => fields.score = true,
                other => {
                    if !fields.patterns.iter().any(|p| p == other) {
                        fields.patterns.push(other.to_string());
                    }
                }
            }
        }

        if fl.trim().is_empty() {
            fields.all = true;
        }
        fields
    }

    /// Whether `name` should appear in a merged document.
    pub fn wants_field(&self, name: &str) -> bool {
        match name {
            SHARD_FIELD => self.shard_info,
            FRAGMENT_IDS_FIELD => self.fragment_ids,
            SCORE_FIELD => self.score,
            _ => self.all || self.patterns.iter().any(|p| pattern_matches(p, name)),
        }
    }

    #[inline]
    pub fn wants_all_fields(&self) -> bool {
        self.all
    }

    #[inline]
    pub fn wants_shard_info(&self) -> bool {
        self.shard_info
    }

    #[inline]
    pub fn wants_fragment_ids(&self) -> bool {
        self.fragment_ids
    }

    #[inline]
    pub fn wants_score(&self) -> bool {
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_means_all() {
        let rf = ReturnFields::parse("  ");
        assert!(rf.wants_all_fields());
        assert!(rf.wants_field("anything"));
        assert!(!rf.wants_score());
        assert!(!rf.wants_shard_info());
        assert!(!rf.wants_fragment_ids());
        assert_eq!(ReturnFields::default(), rf);
    }

    #[test]
    fn test_star_with_pseudo_fields() {
        let rf = ReturnFields::parse("*,[shard],score");
        assert!(rf.wants_all_fields());
        assert!(rf.wants_shard_info());
        assert!(rf.wants_score());
        assert!(rf.wants_field(SHARD_FIELD));
    }

    #[test]
    fn test_explicit_fields() {
        let rf = ReturnFields::parse("id, letter attr_*");
        assert!(!rf.wants_all_fields());
        assert!(rf.wants_field("id"));
        assert!(rf.wants_field("letter"));
        assert!(rf.wants_field("attr_colour"));
        assert!(!rf.wants_field("single"));
        assert!(!rf.wants_field("score"));
    }

    #[test]
    fn test_fragment_ids_not_implied_by_star() {
        let rf = ReturnFields::parse("*");
        assert!(!rf.wants_field(FRAGMENT_IDS_FIELD));

        let rf = ReturnFields::parse("letter,[djoin]");
        assert!(rf.wants_fragment_ids());
        assert!(rf.wants_field(FRAGMENT_IDS_FIELD));
        assert!(!rf.wants_shard_info());
        assert!(!rf.wants_all_fields());
    }

    #[test]
    fn test_score_only() {
        let rf = ReturnFields::parse("score");
        assert!(rf.wants_score());
        assert!(!rf.wants_all_fields());
        assert!(!rf.wants_field("id"));
    }
}
