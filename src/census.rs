//! Census building-stock preparation.
//!
//! The 2016 small-area statistics count building "slots" per
//! (small_area, period_built); a slice of those slots carry the `NS`
//! ("not stated") period sentinel. Before the positional merge can key on
//! period_built, `NS` is replaced with the small area's modal period (global
//! modal fallback) and the replacement is flagged per row.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use log::info;

use crate::data::Value;
use crate::frame::Frame;
use crate::period::{PERIOD_BUILT, PeriodBuilt};

pub const SMALL_AREA: &str = "small_area";
pub const IS_PERIOD_BUILT_ESTIMATED: &str = "is_period_built_estimated";

/// Restricts census rows to the selected counties (case-insensitive exact
/// match on `countyname`). An empty result is an error.
pub fn extract_rows_in_countynames(census: &Frame, countynames: &[String]) -> Result<Frame> {
    let wanted: HashSet<String> = countynames.iter().map(|name| name.to_lowercase()).collect();
    let column = census.require_column("countyname")?;
    let mask: Vec<bool> = column
        .values
        .iter()
        .map(|value| {
            value
                .as_ref()
                .is_some_and(|v| wanted.contains(&v.as_display().to_lowercase()))
        })
        .collect();
    let filtered = census.retain_rows(&mask)?;
    if filtered.is_empty() {
        bail!("No census rows matched the selected counties");
    }
    Ok(filtered)
}

/// Replaces the `NS` period sentinel with the most common period observed in
/// the row's small area, falling back to the dataset-wide mode where a small
/// area has no stated period at all. Adds `is_period_built_estimated`.
///
/// Must run before sequence ids are assigned: the merge key includes
/// period_built.
pub fn replace_not_stated_period_built(stock: &Frame) -> Result<Frame> {
    let periods = stock.require_column(PERIOD_BUILT)?;
    let areas = stock.require_column(SMALL_AREA)?;

    let parsed: Vec<Option<PeriodBuilt>> = periods
        .values
        .iter()
        .map(|value| {
            value
                .as_ref()
                .and_then(|v| v.as_display().parse::<PeriodBuilt>().ok())
        })
        .collect();

    let global_mode = match modal_period(parsed.iter().flatten().copied()) {
        Some(mode) => mode,
        None => bail!("Census stock has no stated period_built anywhere"),
    };

    let mut by_area: HashMap<String, Vec<PeriodBuilt>> = HashMap::new();
    for (row, period) in parsed.iter().enumerate() {
        if let Some(period) = period
            && !period.is_not_stated()
        {
            let area = areas.values[row]
                .as_ref()
                .map(|v| v.as_display())
                .unwrap_or_default();
            by_area.entry(area).or_default().push(*period);
        }
    }

    let mut replaced = Vec::with_capacity(stock.n_rows());
    let mut estimated = Vec::with_capacity(stock.n_rows());
    let mut imputed_rows = 0usize;
    for (row, period) in parsed.iter().enumerate() {
        let is_not_stated = period.is_some_and(|p| p.is_not_stated());
        estimated.push(Some(Value::Boolean(is_not_stated)));
        let resolved = match period {
            Some(p) if !p.is_not_stated() => *p,
            _ => {
                imputed_rows += 1;
                let area = areas.values[row]
                    .as_ref()
                    .map(|v| v.as_display())
                    .unwrap_or_default();
                by_area
                    .get(&area)
                    .and_then(|observed| modal_period(observed.iter().copied()))
                    .unwrap_or(global_mode)
            }
        };
        replaced.push(Some(Value::String(resolved.label().to_string())));
    }
    info!(
        "Imputed period_built for {imputed_rows} of {} census row(s)",
        stock.n_rows()
    );

    let mut result = stock.clone();
    result.set_column(PERIOD_BUILT, replaced)?;
    result.set_column(IS_PERIOD_BUILT_ESTIMATED, estimated)?;
    Ok(result)
}

// Ties break toward the earlier construction era, which is deterministic
// across runs and platforms.
fn modal_period(periods: impl Iterator<Item = PeriodBuilt>) -> Option<PeriodBuilt> {
    let mut counts: HashMap<PeriodBuilt, usize> = HashMap::new();
    for period in periods {
        if !period.is_not_stated() {
            *counts.entry(period).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(period, _)| period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    fn string_cells(values: &[&str]) -> Vec<Option<Value>> {
        values
            .iter()
            .map(|v| Some(Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn not_stated_rows_adopt_the_local_mode() {
        let stock = Frame::from_columns(vec![
            Column::new("small_area", string_cells(&["0", "0", "0", "0", "1", "1"])),
            Column::new(
                PERIOD_BUILT,
                string_cells(&["NS", "PRE19", "PRE19", "11L", "NS", "11L"]),
            ),
        ])
        .unwrap();

        let imputed = replace_not_stated_period_built(&stock).unwrap();

        let periods: Vec<String> = (0..imputed.n_rows())
            .map(|row| imputed.cell(row, PERIOD_BUILT).unwrap().as_display())
            .collect();
        assert_eq!(periods, vec!["PRE19", "PRE19", "PRE19", "11L", "11L", "11L"]);

        let flags: Vec<bool> = (0..imputed.n_rows())
            .map(|row| {
                matches!(
                    imputed.cell(row, IS_PERIOD_BUILT_ESTIMATED),
                    Some(&Value::Boolean(true))
                )
            })
            .collect();
        assert_eq!(flags, vec![true, false, false, false, true, false]);
    }

    #[test]
    fn area_without_stated_periods_falls_back_to_global_mode() {
        let stock = Frame::from_columns(vec![
            Column::new("small_area", string_cells(&["0", "0", "1"])),
            Column::new(PERIOD_BUILT, string_cells(&["61_70", "61_70", "NS"])),
        ])
        .unwrap();
        let imputed = replace_not_stated_period_built(&stock).unwrap();
        assert_eq!(
            imputed.cell(2, PERIOD_BUILT),
            Some(&Value::String("61_70".to_string()))
        );
    }

    #[test]
    fn all_not_stated_is_an_error() {
        let stock = Frame::from_columns(vec![
            Column::new("small_area", string_cells(&["0"])),
            Column::new(PERIOD_BUILT, string_cells(&["NS"])),
        ])
        .unwrap();
        assert!(replace_not_stated_period_built(&stock).is_err());
    }

    #[test]
    fn county_restriction_is_case_insensitive() {
        let census = Frame::from_columns(vec![Column::new(
            "countyname",
            string_cells(&["DUBLIN 1", "Co. Galway"]),
        )])
        .unwrap();
        let filtered =
            extract_rows_in_countynames(&census, &["Dublin 1".to_string()]).unwrap();
        assert_eq!(filtered.n_rows(), 1);
        assert!(extract_rows_in_countynames(&census, &["Co. Kerry".to_string()]).is_err());
    }
}
