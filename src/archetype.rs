//! Statistical archetyping of the building stock.
//!
//! An archetype is the representative profile of all buildings sharing a
//! grouping key: the median of every numeric attribute and the mode of every
//! categorical one. Only groups whose population strictly exceeds the
//! configured sample size contribute an archetype; everything smaller is
//! statistically unreliable and dropped. Archetypes then fill the *missing*
//! attributes of matching stock rows — existing values are never overwritten —
//! cascading from the most specific grouping to the coarsest so later passes
//! only touch what earlier passes could not fill.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::cli::ArchetypeArgs;
use crate::config::PipelineConfig;
use crate::data::Value;
use crate::frame::{Column, Frame};
use crate::io_utils;
use crate::merge::SEQUENCE_ID;
use crate::standardize;

pub const SAMPLE_SIZE: &str = "sample_size";
pub const ARCHETYPE: &str = "archetype";

/// Diagnostic record for one cascade pass.
#[derive(Debug, Clone, Serialize)]
pub struct ArchetypePassSummary {
    pub archetype: String,
    pub archetype_count: usize,
    pub filled_cells: usize,
}

/// Default columns withheld from aggregation: the positional pairing id and
/// the provenance flags earlier stages attach.
pub fn default_exclude_columns() -> Vec<String> {
    vec![
        SEQUENCE_ID.to_string(),
        crate::census::IS_PERIOD_BUILT_ESTIMATED.to_string(),
    ]
}

/// Standalone `archetype` subcommand: compute the archetype table for one
/// grouping and write it out.
pub fn execute(args: &ArchetypeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    io_utils::ensure_supported_output(&args.output)?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let mut stock = io_utils::read_frame(&args.input, delimiter, encoding)?;
    standardize::standardize(&mut stock, &Default::default(), &config)?;

    let on_columns: Vec<String> = args
        .on
        .iter()
        .flat_map(|s| s.split(','))
        .map(crate::data::normalize_column_name)
        .filter(|s| !s.is_empty())
        .collect();
    if on_columns.is_empty() {
        bail!("Archetyping requires at least one grouping column (--on)");
    }
    let sample_size = args.sample_size.unwrap_or(config.sample_size);
    let label = on_columns.iter().join("+");
    let archetypes = create_archetypes(
        &stock,
        &on_columns,
        &default_exclude_columns(),
        sample_size,
        &label,
    )?;
    if archetypes.is_empty() {
        bail!("No group of more than {sample_size} building(s) exists for '{label}'");
    }
    io_utils::write_frame(&args.output, &archetypes, args.delimiter)?;
    info!(
        "Wrote {} archetype(s) for '{label}' to {:?}",
        archetypes.n_rows(),
        args.output
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateKind {
    Numeric,
    Categorical,
}

// A column is numeric only if every observed value is; anything mixed or
// textual aggregates by mode.
fn column_kind(column: &Column) -> AggregateKind {
    let mut any = false;
    for value in column.non_null() {
        any = true;
        if !value.is_numeric() {
            return AggregateKind::Categorical;
        }
    }
    if any {
        AggregateKind::Numeric
    } else {
        AggregateKind::Categorical
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

// Mode with deterministic tie-breaking: highest count, then smallest
// rendered value. An all-null group aggregates to null.
fn mode_or_first(values: impl Iterator<Item = Value>) -> Option<Value> {
    let mut counts: HashMap<String, (usize, Value)> = HashMap::new();
    for value in values {
        let key = value.as_display();
        counts
            .entry(key)
            .and_modify(|entry| entry.0 += 1)
            .or_insert((1, value));
    }
    counts
        .into_iter()
        .max_by(|(key_a, (count_a, _)), (key_b, (count_b, _))| {
            count_a.cmp(count_b).then_with(|| key_b.cmp(key_a))
        })
        .map(|(_, (_, value))| value)
}

fn aggregate_column(column: &Column, rows: &[usize]) -> Option<Value> {
    aggregate_values(column, rows, column_kind(column))
}

fn aggregate_values(column: &Column, rows: &[usize], kind: AggregateKind) -> Option<Value> {
    match kind {
        AggregateKind::Numeric => {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|&row| column.values[row].as_ref().and_then(|v| v.as_f64()))
                .collect();
            median(values).map(Value::Float)
        }
        AggregateKind::Categorical => mode_or_first(
            rows.iter()
                .filter_map(|&row| column.values[row].clone()),
        ),
    }
}

/// Computes the archetype table for one grouping. Groups whose size does not
/// strictly exceed `sample_size` are dropped. A result with zero rows is
/// valid here; the caller decides whether that violates its postcondition.
pub fn create_archetypes(
    stock: &Frame,
    on_columns: &[String],
    exclude_columns: &[String],
    sample_size: usize,
    label: &str,
) -> Result<Frame> {
    let key_indices = stock.key_indices(on_columns)?;
    let groups = stock.group_rows(on_columns)?;
    let retained: Vec<&(String, Vec<usize>)> = groups
        .iter()
        .filter(|(_, rows)| rows.len() > sample_size)
        .collect();

    let excluded: HashSet<&String> = on_columns.iter().chain(exclude_columns).collect();
    let aggregate_columns: Vec<&Column> = stock
        .columns()
        .iter()
        .filter(|column| !excluded.contains(&column.name))
        .collect();

    let mut columns: Vec<Column> = Vec::new();
    for (position, &key_index) in key_indices.iter().enumerate() {
        let values = retained
            .iter()
            .map(|(_, rows)| stock.columns()[key_index].values[rows[0]].clone())
            .collect();
        columns.push(Column::new(on_columns[position].clone(), values));
    }
    for column in aggregate_columns {
        // Kind is decided over the whole column, not per group.
        let kind = column_kind(column);
        let values = retained
            .iter()
            .map(|(_, rows)| aggregate_values(column, rows, kind))
            .collect();
        columns.push(Column::new(column.name.clone(), values));
    }
    columns.push(Column::new(
        SAMPLE_SIZE,
        retained
            .iter()
            .map(|(_, rows)| Some(Value::Integer(rows.len() as i64)))
            .collect(),
    ));
    columns.push(Column::new(
        ARCHETYPE,
        retained
            .iter()
            .map(|_| Some(Value::String(label.to_string())))
            .collect(),
    ));
    Frame::from_columns(columns)
}

/// Fills missing stock cells from matching archetypes. Existing values always
/// win; rows whose key has no retained archetype are untouched. Row order is
/// preserved. Returns the filled stock and the number of cells written.
pub fn fill_with_archetypes(
    stock: &Frame,
    archetypes: &Frame,
    on_columns: &[String],
) -> Result<(Frame, usize)> {
    let stock_key_indices = stock.key_indices(on_columns)?;
    let archetype_key_indices = archetypes.key_indices(on_columns)?;
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for row in 0..archetypes.n_rows() {
        lookup
            .entry(archetypes.row_key(row, &archetype_key_indices))
            .or_insert(row);
    }
    let matches: Vec<Option<usize>> = (0..stock.n_rows())
        .map(|row| lookup.get(&stock.row_key(row, &stock_key_indices)).copied())
        .collect();

    let mut result = stock.clone();
    let mut filled_cells = 0usize;
    for column in archetypes.columns() {
        if on_columns.contains(&column.name) {
            continue;
        }
        let existing = stock.column(&column.name);
        let values: Vec<Option<Value>> = (0..stock.n_rows())
            .map(|row| {
                if let Some(value) = existing.and_then(|c| c.values[row].clone()) {
                    return Some(value);
                }
                let adopted = matches[row].and_then(|idx| column.values[idx].clone());
                if adopted.is_some() {
                    filled_cells += 1;
                }
                adopted
            })
            .collect();
        result.set_column(&column.name, values)?;
    }
    Ok((result, filled_cells))
}

/// Runs the archetype cascade: each key-set is applied in order over the
/// partially-filled stock, so later (coarser) passes only fill what remains
/// missing. The first pass yielding zero archetypes overall is an error;
/// later passes may legitimately contribute nothing.
pub fn apply_archetypes(
    stock: &Frame,
    keysets: &[Vec<String>],
    exclude_columns: &[String],
    sample_size: usize,
) -> Result<(Frame, Vec<ArchetypePassSummary>)> {
    let mut current = stock.clone();
    let mut summaries = Vec::with_capacity(keysets.len());
    let mut exclude = exclude_columns.to_vec();
    exclude.push(SAMPLE_SIZE.to_string());
    exclude.push(ARCHETYPE.to_string());

    for (pass, keys) in keysets.iter().enumerate() {
        let label = keys.iter().join("+");
        if let Some(missing) = keys.iter().find(|key| !current.has_column(key)) {
            warn!("Skipping archetype pass '{label}': missing column '{missing}'");
            summaries.push(ArchetypePassSummary {
                archetype: label,
                archetype_count: 0,
                filled_cells: 0,
            });
            continue;
        }
        let archetypes = create_archetypes(&current, keys, &exclude, sample_size, &label)
            .with_context(|| format!("Computing archetypes for '{label}'"))?;
        if archetypes.is_empty() {
            if pass == 0 {
                bail!(
                    "First archetype pass '{label}' produced no archetypes \
                     (no group exceeds {sample_size} building(s))"
                );
            }
            warn!("Archetype pass '{label}' produced no archetypes");
            summaries.push(ArchetypePassSummary {
                archetype: label,
                archetype_count: 0,
                filled_cells: 0,
            });
            continue;
        }
        let (filled, filled_cells) = fill_with_archetypes(&current, &archetypes, keys)?;
        info!(
            "Archetype pass '{label}': {} archetype(s), {} cell(s) filled",
            archetypes.n_rows(),
            filled_cells
        );
        summaries.push(ArchetypePassSummary {
            archetype: label,
            archetype_count: archetypes.n_rows(),
            filled_cells,
        });
        current = filled;
    }
    Ok((current, summaries))
}
