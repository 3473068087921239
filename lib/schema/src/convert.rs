//! Coercion of raw shard values into declared field types
//!
//! Shards send values in their own local types: a number may arrive as a JSON
//! number or as a string. Each value is converted the same way the aggregator
//! would index it, so values from different shards compare as equal exactly
//! when the field type says they are.

use crate::schema::{FieldType, SchemaFieldDescriptor};
use fedmerge_core::{Error, FieldValue, Result};
use serde_json::Value;

impl FieldType {
    /// Coerce one raw scalar. `null` coerces to nothing.
    pub fn coerce(&self, field: &str, raw: &Value) -> Result<Option<FieldValue>> {
        if raw.is_null() {
            return Ok(None);
        }
        if raw.is_array() || raw.is_object() {
            return Err(conversion_error(field, raw, "not a scalar value"));
        }

        let value = match self {
            FieldType::String | FieldType::Text => FieldValue::Str(match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            FieldType::Int => FieldValue::Int(i64::from(parse_int(field, raw)?)),
            FieldType::Long => FieldValue::Int(parse_long(field, raw)?),
            FieldType::Float => FieldValue::float(f64::from(parse_float(field, raw)?)),
            FieldType::Double => FieldValue::float(parse_double(field, raw)?),
            FieldType::Boolean => FieldValue::Bool(parse_bool(field, raw)?),
            FieldType::ForgivingInt => match parse_int(field, raw) {
                Ok(i) => FieldValue::Int(i64::from(i)),
                Err(_) => FieldValue::float(f64::NAN),
            },
        };
        Ok(Some(value))
    }

    /// Coerce a raw value, flattening arrays and skipping nulls.
    pub fn coerce_all(&self, field: &str, raw: &Value) -> Result<Vec<FieldValue>> {
        match raw {
            Value::Array(values) => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    if let Some(v) = self.coerce(field, value)? {
                        out.push(v);
                    }
                }
                Ok(out)
            }
            other => Ok(self.coerce(field, other)?.into_iter().collect()),
        }
    }
}

impl SchemaFieldDescriptor {
    #[inline]
    pub fn coerce_all(&self, raw: &Value) -> Result<Vec<FieldValue>> {
        self.field_type.coerce_all(&self.name, raw)
    }
}

fn conversion_error(field: &str, raw: &Value, reason: impl Into<String>) -> Error {
    Error::FieldConversion {
        field: field.to_string(),
        value: raw.to_string(),
        reason: reason.into(),
    }
}

fn parse_int(field: &str, raw: &Value) -> Result<i32> {
    let wide = parse_long(field, raw)?;
    i32::try_from(wide).map_err(|_| conversion_error(field, raw, "out of range for int"))
}

fn parse_long(field: &str, raw: &Value) -> Result<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| conversion_error(field, raw, "not an integer")),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|e| conversion_error(field, raw, e.to_string())),
        _ => Err(conversion_error(field, raw, "not an integer")),
    }
}

fn parse_float(field: &str, raw: &Value) -> Result<f32> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| conversion_error(field, raw, "not a number")),
        Value::String(s) => s
            .parse::<f32>()
            .map_err(|e| conversion_error(field, raw, e.to_string())),
        _ => Err(conversion_error(field, raw, "not a number")),
    }
}

fn parse_double(field: &str, raw: &Value) -> Result<f64> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| conversion_error(field, raw, "not a number")),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| conversion_error(field, raw, e.to_string())),
        _ => Err(conversion_error(field, raw, "not a number")),
    }
}

fn parse_bool(field: &str, raw: &Value) -> Result<bool> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(conversion_error(field, raw, "not a boolean")),
        },
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(conversion_error(field, raw, "not a boolean")),
        },
        _ => Err(conversion_error(field, raw, "not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coerce(t: FieldType, raw: Value) -> Result<Option<FieldValue>> {
        t.coerce("f", &raw)
    }

    #[test]
    fn test_string_renders_scalars() {
        assert_eq!(coerce(FieldType::String, json!("x")).unwrap(), Some(FieldValue::from("x")));
        assert_eq!(coerce(FieldType::Text, json!(12)).unwrap(), Some(FieldValue::from("12")));
        assert_eq!(coerce(FieldType::String, json!(true)).unwrap(), Some(FieldValue::from("true")));
        assert_eq!(coerce(FieldType::String, json!(null)).unwrap(), None);
    }

    #[test]
    fn test_numeric_string_and_number_agree() {
        assert_eq!(
            coerce(FieldType::Int, json!("1")).unwrap(),
            coerce(FieldType::Int, json!(1)).unwrap()
        );
        assert_eq!(
            coerce(FieldType::Double, json!("2.5")).unwrap(),
            Some(FieldValue::float(2.5))
        );
        assert_eq!(coerce(FieldType::Long, json!("-9000000000")).unwrap(), Some(FieldValue::Int(-9_000_000_000)));
    }

    #[test]
    fn test_float_has_single_precision() {
        let v = coerce(FieldType::Float, json!(0.1)).unwrap().unwrap();
        assert_eq!(v, FieldValue::float(f64::from(0.1f32)));
    }

    #[test]
    fn test_conversion_errors_name_the_field() {
        let err = FieldType::Int.coerce("number", &json!("NaN")).unwrap_err();
        assert_eq!(err.field(), Some("number"));
        assert!(matches!(err, Error::FieldConversion { .. }));

        assert!(coerce(FieldType::Int, json!(3_000_000_000i64)).is_err());
        assert!(coerce(FieldType::Long, json!(1.5)).is_err());
        assert!(coerce(FieldType::Boolean, json!("maybe")).is_err());
        assert!(coerce(FieldType::String, json!({"a": 1})).is_err());
    }

    #[test]
    fn test_forgiving_int() {
        assert_eq!(coerce(FieldType::ForgivingInt, json!("42")).unwrap(), Some(FieldValue::Int(42)));
        let nan = coerce(FieldType::ForgivingInt, json!("forty-two")).unwrap().unwrap();
        assert!(nan.as_f64().unwrap().is_nan());
    }

    #[test]
    fn test_booleans() {
        assert_eq!(coerce(FieldType::Boolean, json!("T")).unwrap(), Some(FieldValue::Bool(true)));
        assert_eq!(coerce(FieldType::Boolean, json!(0)).unwrap(), Some(FieldValue::Bool(false)));
    }

    #[test]
    fn test_coerce_all_flattens() {
        let field = SchemaFieldDescriptor::new("n", FieldType::Int).multi_valued();
        let values = field.coerce_all(&json!([1, "2", null, 3])).unwrap();
        assert_eq!(values, vec![FieldValue::Int(1), FieldValue::Int(2), FieldValue::Int(3)]);
        assert!(field.coerce_all(&json!(null)).unwrap().is_empty());
        assert!(field.coerce_all(&json!([1, "x"])).is_err());
    }
}
