use std::fmt;

use anyhow::{Context, Result, bail};
use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single typed cell. Empty CSV fields parse to `None` at the frame layer,
/// so `Value` itself is never "null".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Guid(Uuid),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Guid(g) => g.to_string(),
        }
    }

    /// Numeric view used by aggregation; `None` for non-numeric variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Guid,
}

/// Canonicalize a raw header into the attribute vocabulary's shape.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_snake_case()
}

pub fn parse_typed_value(value: &str, ty: &ColumnType) -> Result<Option<Value>> {
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::String(value.to_string()),
        ColumnType::Integer => {
            let parsed: i64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as integer"))?;
            Value::Integer(parsed)
        }
        ColumnType::Float => {
            let parsed: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            Value::Float(parsed)
        }
        ColumnType::Boolean => {
            let lowered = value.trim().to_ascii_lowercase();
            let parsed = match lowered.as_str() {
                "true" | "t" | "yes" | "y" | "1" => true,
                "false" | "f" | "no" | "n" | "0" => false,
                _ => bail!("Failed to parse '{value}' as boolean"),
            };
            Value::Boolean(parsed)
        }
        ColumnType::Guid => {
            let trimmed = value.trim().trim_matches(|c| matches!(c, '{' | '}'));
            let parsed = Uuid::parse_str(trimmed)
                .with_context(|| format!("Failed to parse '{value}' as GUID"))?;
            Value::Guid(parsed)
        }
    };
    Ok(Some(parsed))
}

/// Cell-wise inference for columns without a dtype hint: integer, then float,
/// then boolean, else the raw string (preserved verbatim, spaces included).
pub fn infer_value(value: &str) -> Option<Value> {
    if value.is_empty() {
        return None;
    }
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Some(Value::Integer(parsed));
    }
    if let Ok(parsed) = trimmed.parse::<f64>() {
        return Some(Value::Float(parsed));
    }
    match trimmed {
        "true" | "false" => Some(Value::Boolean(trimmed == "true")),
        _ => Some(Value::String(value.to_string())),
    }
}

pub fn value_to_evalexpr(value: &Value) -> evalexpr::Value {
    match value {
        Value::String(s) => evalexpr::Value::String(s.clone()),
        Value::Integer(i) => evalexpr::Value::Int(*i),
        Value::Float(f) => evalexpr::Value::Float(*f),
        Value::Boolean(b) => evalexpr::Value::Boolean(*b),
        Value::Guid(g) => evalexpr::Value::String(g.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_column_name_snake_cases_raw_headers() {
        assert_eq!(
            normalize_column_name("Ground Floor Area"),
            "ground_floor_area"
        );
        assert_eq!(
            normalize_column_name(" Year of construction "),
            "year_of_construction"
        );
    }

    #[test]
    fn parse_typed_value_handles_empty_and_boolean_inputs() {
        assert_eq!(parse_typed_value("", &ColumnType::Integer).unwrap(), None);

        let truthy = parse_typed_value("Yes", &ColumnType::Boolean)
            .unwrap()
            .unwrap();
        assert_eq!(truthy, Value::Boolean(true));

        assert!(parse_typed_value("maybe", &ColumnType::Boolean).is_err());
    }

    #[test]
    fn parse_typed_value_preserves_string_padding() {
        let parsed = parse_typed_value("Provisional    ", &ColumnType::String)
            .unwrap()
            .unwrap();
        assert_eq!(parsed, Value::String("Provisional    ".to_string()));
    }

    #[test]
    fn infer_value_prefers_integer_over_float() {
        assert_eq!(infer_value("42"), Some(Value::Integer(42)));
        assert_eq!(infer_value("42.5"), Some(Value::Float(42.5)));
        assert_eq!(infer_value(""), None);
        assert_eq!(
            infer_value("Detached house"),
            Some(Value::String("Detached house".to_string()))
        );
    }

    #[test]
    fn leading_zero_identifiers_survive_as_strings() {
        let parsed = parse_typed_value("077089001", &ColumnType::String)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.as_display(), "077089001");
    }

    #[test]
    fn value_to_evalexpr_preserves_variants() {
        assert_eq!(
            value_to_evalexpr(&Value::Integer(42)),
            evalexpr::Value::Int(42)
        );
        assert_eq!(
            value_to_evalexpr(&Value::Boolean(false)),
            evalexpr::Value::Boolean(false)
        );
    }
}
