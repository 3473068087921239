use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot convert value {value} for field {field}: {reason}")]
    FieldConversion {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Field not multi-valued: {field}")]
    FieldNotMultiValued { field: String },

    #[error("Required field has no value: {field}")]
    MissingRequiredField { field: String },

    #[error("Merge strategy failed for field {field}: {message}")]
    MergeStrategy { field: String, message: String },

    #[error("Document {position} from shard {shard} has no unique key {key}")]
    MissingUniqueKey {
        shard: String,
        position: usize,
        key: String,
    },

    #[error("Invalid sort: {0}")]
    InvalidSort(String),
}

impl Error {
    /// The schema field a merge failure refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::FieldConversion { field, .. }
            | Error::FieldNotMultiValued { field }
            | Error::MissingRequiredField { field }
            | Error::MergeStrategy { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Whether this error is one of the merge failures that abort a query.
    pub fn is_merge_failure(&self) -> bool {
        self.field().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_is_named() {
        let err = Error::FieldNotMultiValued { field: "single".to_string() };
        assert_eq!(err.field(), Some("single"));
        assert!(err.is_merge_failure());
        assert_eq!(err.to_string(), "Field not multi-valued: single");
    }

    #[test]
    fn test_non_merge_errors_have_no_field() {
        let err = Error::InvalidSort("letter sideways".to_string());
        assert_eq!(err.field(), None);
        assert!(!err.is_merge_failure());
    }
}
