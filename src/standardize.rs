//! Column standardization: raw extract headers to the canonical vocabulary.
//!
//! Renaming is exact-match against the configured mapping table; unmapped
//! columns pass through untouched. Typing is hint-driven: canonical columns
//! with a dtype hint are parsed to that type, anything else is inferred
//! cell-wise. Applying the standardizer twice is a no-op.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};

use crate::config::PipelineConfig;
use crate::data::{ColumnType, Value, infer_value, parse_typed_value};
use crate::frame::Frame;

pub fn standardize(frame: &mut Frame, mapping: &BTreeMap<String, String>, config: &PipelineConfig) -> Result<()> {
    frame.rename_columns(mapping);
    coerce_types(frame, &config.dtypes)
}

fn coerce_types(frame: &mut Frame, dtypes: &BTreeMap<String, ColumnType>) -> Result<()> {
    let headers = frame.headers();
    for name in headers {
        let hint = dtypes.get(&name);
        let column = frame.require_column(&name)?;
        let mut coerced = Vec::with_capacity(column.values.len());
        for (row, value) in column.values.iter().enumerate() {
            let cell = match (value, hint) {
                (None, _) => None,
                (Some(value), Some(ty)) => coerce_value(value, ty)
                    .with_context(|| format!("Column '{name}', row {}", row + 2))?,
                (Some(Value::String(raw)), None) => infer_value(raw),
                (Some(other), None) => Some(other.clone()),
            };
            coerced.push(cell);
        }
        frame.set_column(&name, coerced)?;
    }
    Ok(())
}

fn coerce_value(value: &Value, ty: &ColumnType) -> Result<Option<Value>> {
    let coerced = match (value, ty) {
        (Value::String(raw), _) => return parse_typed_value(raw, ty),
        (Value::Integer(_), ColumnType::Integer)
        | (Value::Float(_), ColumnType::Float)
        | (Value::Boolean(_), ColumnType::Boolean)
        | (Value::Guid(_), ColumnType::Guid) => value.clone(),
        (Value::Integer(i), ColumnType::Float) => Value::Float(*i as f64),
        (Value::Float(f), ColumnType::Integer) if f.fract() == 0.0 => Value::Integer(*f as i64),
        (other, ColumnType::String) => Value::String(other.as_display()),
        (other, ty) => bail!("Cannot coerce {other:?} to {ty:?}"),
    };
    Ok(Some(coerced))
}
