//! Census merge engine.
//!
//! Census rows are the ground truth for *how many* dwellings exist per
//! (granularity, period_built); BER records are the ground truth for *what
//! attributes* surveyed dwellings have. No real identifier links the two, so
//! the pairing is positional: both sides receive a 1-based rank within their
//! (granularity, period_built) group and the merge joins on
//! {granularity, period_built, rank}. Excess rows on the larger side of a
//! group are dropped by construction; the loss is quantified in
//! [`MergeDiagnostics`], never raised.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use log::info;
use serde::Serialize;

use crate::config::{Granularity, JoinKind};
use crate::data::Value;
use crate::frame::{Column, Frame};
use crate::period::{self, PERIOD_BUILT, YEAR_OF_CONSTRUCTION};

/// Positional pairing column. Not a semantic identifier of a real building —
/// only unique relative to its (granularity, period_built) group.
pub const SEQUENCE_ID: &str = "id";

/// The census reference year. Dwellings built at or after it cannot have been
/// counted and bypass the join.
pub const CENSUS_CUTOFF_YEAR: i64 = 2016;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeDiagnostics {
    pub census_slots: usize,
    pub ber_records: usize,
    pub matched: usize,
    pub unmatched_census_slots: usize,
    /// Pre-cutoff BER records without a census slot; dropped under a left
    /// join, appended under an outer join.
    pub unmatched_ber_records: usize,
    pub appended_post_cutoff: usize,
    pub dropped_null_year: usize,
}

/// Assigns each row its 1-based rank within its key group, in row encounter
/// order. Encounter order equals input record order, which earlier stages
/// never re-sort, so repeated runs produce identical ranks.
pub fn group_sequence_ids(frame: &Frame, keys: &[String]) -> Result<Vec<Option<Value>>> {
    let key_indices = frame.key_indices(keys)?;
    let mut counters: HashMap<String, i64> = HashMap::new();
    let mut ids = Vec::with_capacity(frame.n_rows());
    for row in 0..frame.n_rows() {
        let key = frame.row_key(row, &key_indices);
        let counter = counters.entry(key).or_insert(0);
        *counter += 1;
        ids.push(Some(Value::Integer(*counter)));
    }
    Ok(ids)
}

fn lowercase_column(frame: &mut Frame, name: &str) -> Result<()> {
    let column = frame.require_column(name)?;
    let lowered = column
        .values
        .iter()
        .map(|value| {
            value
                .as_ref()
                .map(|v| Value::String(v.as_display().to_lowercase()))
        })
        .collect();
    frame.set_column(name, lowered)
}

/// Fills census building slots with BER attribute rows.
///
/// Both sides get lowercased granularity keys and within-group sequence ids;
/// the BER side is (re)classified into period_built from its construction
/// year. Records built before [`CENSUS_CUTOFF_YEAR`] join positionally onto
/// census slots; records built at or after it are appended unmodified.
pub fn fill_census_with_bers(
    census: &Frame,
    bers: &Frame,
    granularity: Granularity,
    join: JoinKind,
) -> Result<(Frame, MergeDiagnostics)> {
    let granularity_column = granularity.column();
    let mut census = census.clone();
    let mut bers = bers.clone();
    lowercase_column(&mut census, granularity_column)?;
    lowercase_column(&mut bers, granularity_column)?;
    period::classify_frame(&mut bers)?;
    census.require_column(PERIOD_BUILT)?;

    let merge_keys = vec![
        granularity_column.to_string(),
        PERIOD_BUILT.to_string(),
        SEQUENCE_ID.to_string(),
    ];
    let group_keys = &merge_keys[..2];
    let census_ids = group_sequence_ids(&census, group_keys)?;
    census.set_column(SEQUENCE_ID, census_ids)?;
    let ber_ids = group_sequence_ids(&bers, group_keys)?;
    bers.set_column(SEQUENCE_ID, ber_ids)?;

    let mut diagnostics = MergeDiagnostics {
        census_slots: census.n_rows(),
        ber_records: bers.n_rows(),
        ..MergeDiagnostics::default()
    };

    let years = bers.require_column(YEAR_OF_CONSTRUCTION)?;
    let mut pre_cutoff_rows = Vec::new();
    let mut post_cutoff_rows = Vec::new();
    for (row, year) in years.values.iter().enumerate() {
        match year.as_ref().and_then(|v| v.as_i64()) {
            Some(year) if year < CENSUS_CUTOFF_YEAR => pre_cutoff_rows.push(row),
            Some(_) => post_cutoff_rows.push(row),
            // Unclassifiable rows belong to neither partition; original
            // behavior, kept and counted.
            None => diagnostics.dropped_null_year += 1,
        }
    }

    let mut ber_join_side = bers.take_rows(&pre_cutoff_rows);
    if granularity == Granularity::SmallArea {
        // The census-linked county is more reliable than the surveyed one,
        // and keeping both would collide on merge.
        ber_join_side.drop_column("countyname");
    }

    let join_indices = ber_join_side.key_indices(&merge_keys)?;
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for row in 0..ber_join_side.n_rows() {
        lookup
            .entry(ber_join_side.row_key(row, &join_indices))
            .or_insert(row);
    }

    let mut seen: HashSet<String> = census.headers().into_iter().collect();
    let attribute_columns: Vec<(String, String)> = ber_join_side
        .headers()
        .into_iter()
        .filter(|name| !merge_keys.contains(name))
        .map(|name| {
            let mut output = name.clone();
            let mut counter = 1usize;
            while seen.contains(&output) {
                output = format!("ber_{name}_{counter}");
                counter += 1;
            }
            seen.insert(output.clone());
            (name, output)
        })
        .collect();

    let census_key_indices = census.key_indices(&merge_keys)?;
    let mut matched_rows: Vec<Option<usize>> = Vec::with_capacity(census.n_rows());
    let mut claimed: HashSet<usize> = HashSet::new();
    for row in 0..census.n_rows() {
        let key = census.row_key(row, &census_key_indices);
        let matched = lookup.get(&key).copied();
        if let Some(ber_row) = matched {
            claimed.insert(ber_row);
            diagnostics.matched += 1;
        }
        matched_rows.push(matched);
    }
    diagnostics.unmatched_census_slots = diagnostics.census_slots - diagnostics.matched;
    let unmatched_ber: Vec<usize> = (0..ber_join_side.n_rows())
        .filter(|row| !claimed.contains(row))
        .collect();
    diagnostics.unmatched_ber_records = unmatched_ber.len();

    let outer_rows: &[usize] = match join {
        JoinKind::Left => &[],
        JoinKind::Outer => &unmatched_ber,
    };

    let mut columns = Vec::new();
    for column in census.columns() {
        let mut values = column.values.clone();
        for &ber_row in outer_rows {
            // Key columns carry over from the BER side; census-only columns
            // stay null for slots the census never counted.
            let value = if merge_keys.contains(&column.name) {
                ber_join_side
                    .column(&column.name)
                    .and_then(|c| c.values[ber_row].clone())
            } else {
                None
            };
            values.push(value);
        }
        columns.push(Column::new(column.name.clone(), values));
    }
    for (source, output) in &attribute_columns {
        let ber_column = ber_join_side.require_column(source)?;
        let mut values: Vec<Option<Value>> = matched_rows
            .iter()
            .map(|matched| matched.and_then(|row| ber_column.values[row].clone()))
            .collect();
        for &ber_row in outer_rows {
            values.push(ber_column.values[ber_row].clone());
        }
        columns.push(Column::new(output.clone(), values));
    }
    let joined = Frame::from_columns(columns)?;

    let post_cutoff = bers.take_rows(&post_cutoff_rows);
    diagnostics.appended_post_cutoff = post_cutoff.n_rows();
    let stock = joined.vstack(&post_cutoff);

    info!(
        "Filled {} census slot(s) with {} of {} BER record(s); {} slot(s) unmatched, \
         {} BER record(s) unmatched, {} appended post-{}, {} dropped for null year",
        diagnostics.census_slots,
        diagnostics.matched,
        diagnostics.ber_records,
        diagnostics.unmatched_census_slots,
        diagnostics.unmatched_ber_records,
        diagnostics.appended_post_cutoff,
        CENSUS_CUTOFF_YEAR,
        diagnostics.dropped_null_year,
    );
    if stock.is_empty() {
        bail!("Census merge produced an empty stock");
    }
    Ok((stock, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_cells(values: &[&str]) -> Vec<Option<Value>> {
        values
            .iter()
            .map(|v| Some(Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn sequence_ids_rank_within_groups_in_encounter_order() {
        let frame = Frame::from_columns(vec![Column::new(
            "small_area",
            string_cells(&["a", "b", "a", "a", "b"]),
        )])
        .unwrap();
        let ids = group_sequence_ids(&frame, &["small_area".to_string()]).unwrap();
        let ranks: Vec<i64> = ids
            .iter()
            .map(|v| v.as_ref().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ranks, vec![1, 1, 2, 3, 2]);
    }

    #[test]
    fn sequence_ids_are_unique_only_within_their_group() {
        let frame = Frame::from_columns(vec![Column::new(
            "small_area",
            string_cells(&["a", "b"]),
        )])
        .unwrap();
        let ids = group_sequence_ids(&frame, &["small_area".to_string()]).unwrap();
        assert_eq!(ids[0], ids[1]);
    }
}
