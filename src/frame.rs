//! Minimal in-memory tabular layer.
//!
//! A [`Frame`] is a column-major table of `Option<Value>` cells. It supports
//! exactly the operations the pipeline needs — rename, row masking/taking,
//! stable group-by, column add/drop, and column-union concatenation — so the
//! transformation stages stay engine-agnostic.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow, bail};

use crate::data::Value;

/// Separator for composite group keys. Unit-separator keeps rendered key
/// parts from colliding with real cell content.
pub const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn non_null(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().filter_map(|v| v.as_ref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.values.len();
            for column in &columns {
                if column.values.len() != expected {
                    bail!(
                        "Column '{}' has {} row(s), expected {}",
                        column.name,
                        column.values.len(),
                        expected
                    );
                }
            }
        }
        let mut seen = HashMap::new();
        for column in &columns {
            if seen.insert(column.name.clone(), ()).is_some() {
                bail!("Duplicate column name '{}'", column.name);
            }
        }
        Ok(Self { columns })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| anyhow!("Column '{name}' not found"))
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Value> {
        self.column(name)
            .and_then(|c| c.values.get(row))
            .and_then(|v| v.as_ref())
    }

    /// Appends a new column; the name must be fresh and the length must match.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<Value>>) -> Result<()> {
        let name = name.into();
        if self.has_column(&name) {
            bail!("Column '{name}' already exists");
        }
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            bail!(
                "Column '{name}' has {} row(s), expected {}",
                values.len(),
                self.n_rows()
            );
        }
        self.columns.push(Column::new(name, values));
        Ok(())
    }

    /// Overwrites an existing column or appends a new one.
    pub fn set_column(&mut self, name: &str, values: Vec<Option<Value>>) -> Result<()> {
        match self.column_index(name) {
            Some(idx) => {
                if values.len() != self.n_rows() {
                    bail!(
                        "Column '{name}' has {} row(s), expected {}",
                        values.len(),
                        self.n_rows()
                    );
                }
                self.columns[idx].values = values;
                Ok(())
            }
            None => self.push_column(name.to_string(), values),
        }
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        self.column_index(name).map(|idx| self.columns.remove(idx))
    }

    /// Exact-match rename; names absent from the mapping pass through.
    pub fn rename_columns(&mut self, mapping: &BTreeMap<String, String>) {
        for column in &mut self.columns {
            if let Some(renamed) = mapping.get(&column.name) {
                column.name = renamed.clone();
            }
        }
    }

    pub fn take_rows(&self, rows: &[usize]) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let values = rows
                    .iter()
                    .map(|&row| column.values.get(row).cloned().flatten())
                    .collect();
                Column::new(column.name.clone(), values)
            })
            .collect();
        Frame { columns }
    }

    pub fn retain_rows(&self, mask: &[bool]) -> Result<Frame> {
        if mask.len() != self.n_rows() {
            bail!(
                "Row mask has {} entries, expected {}",
                mask.len(),
                self.n_rows()
            );
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect();
        Ok(self.take_rows(&rows))
    }

    /// Renders the composite group key for one row. Null parts render empty,
    /// so two nulls (or a null and an empty string) compare equal.
    pub fn row_key(&self, row: usize, key_indices: &[usize]) -> String {
        let mut parts = Vec::with_capacity(key_indices.len());
        for &idx in key_indices {
            let part = self.columns[idx]
                .values
                .get(row)
                .and_then(|v| v.as_ref())
                .map(|v| v.as_display())
                .unwrap_or_default();
            parts.push(part);
        }
        parts.join(KEY_SEPARATOR)
    }

    pub fn key_indices(&self, keys: &[String]) -> Result<Vec<usize>> {
        keys.iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| anyhow!("Column '{name}' not found"))
            })
            .collect()
    }

    /// Stable group-by: groups appear in first-encounter order and row indices
    /// within a group preserve encounter order. This ordering contract is what
    /// makes positional sequence ids reproducible across runs.
    pub fn group_rows(&self, keys: &[String]) -> Result<Vec<(String, Vec<usize>)>> {
        let key_indices = self.key_indices(keys)?;
        let mut order: Vec<(String, Vec<usize>)> = Vec::new();
        let mut lookup: HashMap<String, usize> = HashMap::new();
        for row in 0..self.n_rows() {
            let key = self.row_key(row, &key_indices);
            match lookup.get(&key) {
                Some(&slot) => order[slot].1.push(row),
                None => {
                    lookup.insert(key.clone(), order.len());
                    order.push((key, vec![row]));
                }
            }
        }
        Ok(order)
    }

    /// Stacks another frame below this one, taking the union of columns.
    /// Cells missing on either side are null.
    pub fn vstack(&self, other: &Frame) -> Frame {
        let top_rows = self.n_rows();
        let bottom_rows = other.n_rows();
        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .map(|column| {
                let mut values = column.values.clone();
                match other.column(&column.name) {
                    Some(bottom) => values.extend(bottom.values.iter().cloned()),
                    None => values.extend(std::iter::repeat_n(None, bottom_rows)),
                }
                Column::new(column.name.clone(), values)
            })
            .collect();
        for column in &other.columns {
            if self.has_column(&column.name) {
                continue;
            }
            let mut values: Vec<Option<Value>> = std::iter::repeat_n(None, top_rows).collect();
            values.extend(column.values.iter().cloned());
            columns.push(Column::new(column.name.clone(), values));
        }
        Frame { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_cell(value: &str) -> Option<Value> {
        Some(Value::String(value.to_string()))
    }

    fn sample_frame() -> Frame {
        Frame::from_columns(vec![
            Column::new(
                "small_area",
                vec![string_cell("a"), string_cell("b"), string_cell("a")],
            ),
            Column::new(
                "period_built",
                vec![string_cell("PRE19"), string_cell("11L"), string_cell("PRE19")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn from_columns_rejects_ragged_lengths() {
        let result = Frame::from_columns(vec![
            Column::new("a", vec![string_cell("x")]),
            Column::new("b", vec![]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn group_rows_preserves_encounter_order() {
        let frame = sample_frame();
        let groups = frame
            .group_rows(&["small_area".to_string(), "period_built".to_string()])
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1, vec![0, 2]);
        assert_eq!(groups[1].1, vec![1]);
    }

    #[test]
    fn null_key_parts_render_empty_but_group_deterministically() {
        let frame = Frame::from_columns(vec![Column::new(
            "k",
            vec![None, string_cell("x"), None],
        )])
        .unwrap();
        let groups = frame.group_rows(&["k".to_string()]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1, vec![0, 2]);
    }

    #[test]
    fn retain_rows_never_expands() {
        let frame = sample_frame();
        let kept = frame.retain_rows(&[true, false, true]).unwrap();
        assert_eq!(kept.n_rows(), 2);
        assert!(kept.n_rows() <= frame.n_rows());
    }

    #[test]
    fn vstack_takes_column_union() {
        let top = sample_frame();
        let bottom = Frame::from_columns(vec![
            Column::new("small_area", vec![string_cell("c")]),
            Column::new("wall_uvalue", vec![Some(Value::Float(0.5))]),
        ])
        .unwrap();
        let stacked = top.vstack(&bottom);
        assert_eq!(stacked.n_rows(), 4);
        assert_eq!(
            stacked.headers(),
            vec!["small_area", "period_built", "wall_uvalue"]
        );
        assert_eq!(stacked.cell(3, "period_built"), None);
        assert_eq!(stacked.cell(3, "wall_uvalue"), Some(&Value::Float(0.5)));
        assert_eq!(stacked.cell(0, "wall_uvalue"), None);
    }

    #[test]
    fn rename_is_exact_match_and_idempotent() {
        let mut frame = sample_frame();
        let mut mapping = BTreeMap::new();
        mapping.insert("small_area".to_string(), "sa".to_string());
        frame.rename_columns(&mapping);
        assert!(frame.has_column("sa"));
        frame.rename_columns(&mapping);
        assert!(frame.has_column("sa"));
        assert!(!frame.has_column("small_area"));
    }
}
