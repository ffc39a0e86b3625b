//! Row elimination against domain validity rules.
//!
//! Filters are named boolean conditions over canonical columns. The default
//! set is generated from the configured bounds table; callers choose which
//! names to enable and the enabled conditions apply as an AND chain in
//! declaration order. Each applied condition reports the share of rows it
//! removed; a chain that empties the dataset is an error, not a result.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use evalexpr::{ContextWithMutableVariables, HashMapContext, eval_boolean_with_context};
use log::{info, warn};
use regex::RegexBuilder;
use serde::Serialize;

use crate::config::{Bounds, MissingColumnPolicy, PipelineConfig};
use crate::data::Value;
use crate::frame::Frame;

#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub name: String,
    /// Canonical columns the expression reads; checked against the dataset
    /// before any row is evaluated.
    pub columns: Vec<String>,
    /// `evalexpr` boolean expression over those columns.
    pub expression: String,
}

/// Per-condition diagnostic captured for the run summary. Reporting never
/// feeds back into the filtering outcome.
#[derive(Debug, Clone, Serialize)]
pub struct FilterOutcome {
    pub name: String,
    pub applied: bool,
    pub removed: usize,
    pub percent_removed: f64,
}

impl FilterOutcome {
    fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            applied: false,
            removed: 0,
            percent_removed: 0.0,
        }
    }
}

/// The standard erroneous-record conditions, in declaration order. Bounds
/// combine as closed AND intervals (`lb < x < ub`).
pub fn standard_conditions(config: &PipelineConfig) -> Vec<FilterCondition> {
    let mut conditions = vec![provisional_condition(config)];
    for attribute in [
        "ground_floor_area",
        "living_area_percent",
        "main_sh_boiler_efficiency",
        "main_hw_boiler_efficiency",
        "main_sh_boiler_efficiency_adjustment_factor",
        "main_hw_boiler_efficiency_adjustment_factor",
        "declared_loss_factor",
        "thermal_bridging_factor",
    ] {
        if let Some(bounds) = config.bounds_for(attribute)
            && let Some(condition) = bound_condition(attribute, bounds)
        {
            conditions.push(condition);
        }
    }
    conditions
}

pub fn condition_names(conditions: &[FilterCondition]) -> Vec<String> {
    conditions.iter().map(|c| c.name.clone()).collect()
}

fn provisional_condition(config: &PipelineConfig) -> FilterCondition {
    let expression = config
        .provisional_ratings
        .iter()
        .map(|label| format!("type_of_rating != \"{label}\""))
        .collect::<Vec<_>>()
        .join(" && ");
    FilterCondition {
        name: "Is not provisional".to_string(),
        columns: vec!["type_of_rating".to_string()],
        expression,
    }
}

fn bound_condition(attribute: &str, bounds: Bounds) -> Option<FilterCondition> {
    let (name, expression) = match (bounds.lower, bounds.upper) {
        (Some(lb), Some(ub)) => (
            format!("lb < {attribute} < ub"),
            format!(
                "{attribute} > {} && {attribute} < {}",
                literal(lb),
                literal(ub)
            ),
        ),
        (Some(lb), None) => (
            format!("{attribute} > lb"),
            format!("{attribute} > {}", literal(lb)),
        ),
        (None, Some(ub)) => (
            format!("{attribute} < ub"),
            format!("{attribute} < {}", literal(ub)),
        ),
        (None, None) => return None,
    };
    Some(FilterCondition {
        name,
        columns: vec![attribute.to_string()],
        expression,
    })
}

// Bounds render with a decimal point and numeric cells bind as floats, so
// every comparison inside evalexpr is float-vs-float.
fn literal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn bind_value(value: &Value) -> evalexpr::Value {
    match value {
        Value::Integer(i) => evalexpr::Value::Float(*i as f64),
        other => crate::data::value_to_evalexpr(other),
    }
}

/// Applies the enabled subset of `conditions` as an AND chain. Disabled
/// conditions are the identity. Rows with a null in a referenced column fail
/// the condition.
pub fn apply_conditions(
    frame: &Frame,
    conditions: &[FilterCondition],
    selected: &[String],
    policy: MissingColumnPolicy,
) -> Result<(Frame, Vec<FilterOutcome>)> {
    let mut current = frame.clone();
    let mut outcomes = Vec::with_capacity(conditions.len());
    for condition in conditions {
        if !selected.iter().any(|name| name == &condition.name) {
            outcomes.push(FilterOutcome::skipped(&condition.name));
            continue;
        }
        let missing: Vec<&String> = condition
            .columns
            .iter()
            .filter(|column| !current.has_column(column))
            .collect();
        if !missing.is_empty() {
            match policy {
                MissingColumnPolicy::Error => bail!(
                    "Filter '{}' references missing column(s) {:?}",
                    condition.name,
                    missing
                ),
                MissingColumnPolicy::Skip => {
                    warn!(
                        "Skipping filter '{}': missing column(s) {:?}",
                        condition.name, missing
                    );
                    outcomes.push(FilterOutcome::skipped(&condition.name));
                    continue;
                }
            }
        }

        let before = current.n_rows();
        let mask = condition_mask(&current, condition)?;
        let filtered = current.retain_rows(&mask)?;
        let removed = before - filtered.n_rows();
        let percent_removed = if before > 0 {
            100.0 * removed as f64 / before as f64
        } else {
            0.0
        };
        info!(
            "{:.2}% removed by '{}'",
            percent_removed, condition.name
        );
        if filtered.is_empty() {
            bail!("Filter '{}' removed every remaining row", condition.name);
        }
        outcomes.push(FilterOutcome {
            name: condition.name.clone(),
            applied: true,
            removed,
            percent_removed,
        });
        current = filtered;
    }
    Ok((current, outcomes))
}

fn condition_mask(frame: &Frame, condition: &FilterCondition) -> Result<Vec<bool>> {
    let column_indices = frame.key_indices(&condition.columns)?;
    let mut mask = Vec::with_capacity(frame.n_rows());
    for row in 0..frame.n_rows() {
        let mut context = HashMapContext::new();
        let mut complete = true;
        for (&idx, name) in column_indices.iter().zip(&condition.columns) {
            match frame.columns()[idx].values[row].as_ref() {
                Some(value) => context
                    .set_value(name.clone(), bind_value(value))
                    .with_context(|| format!("Binding column '{name}'"))?,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            mask.push(false);
            continue;
        }
        let keep = eval_boolean_with_context(&condition.expression, &context)
            .with_context(|| {
                format!(
                    "Evaluating filter '{}' expression '{}'",
                    condition.name, condition.expression
                )
            })?;
        mask.push(keep);
    }
    Ok(mask)
}

/// Categorical set-membership filter (e.g. valid small-area ids). Both sides
/// are compared through their rendered display form.
pub fn retain_by_membership(
    frame: &Frame,
    column: &str,
    values: &HashSet<String>,
    policy: MissingColumnPolicy,
) -> Result<Frame> {
    let Some(target) = frame.column(column) else {
        match policy {
            MissingColumnPolicy::Error => {
                bail!("Membership filter references missing column '{column}'")
            }
            MissingColumnPolicy::Skip => {
                warn!("Skipping membership filter: missing column '{column}'");
                return Ok(frame.clone());
            }
        }
    };
    let mask: Vec<bool> = target
        .values
        .iter()
        .map(|value| {
            value
                .as_ref()
                .is_some_and(|v| values.contains(&v.as_display()))
        })
        .collect();
    let before = frame.n_rows();
    let filtered = frame.retain_rows(&mask)?;
    let removed = before - filtered.n_rows();
    info!(
        "{:.2}% removed by membership filter on '{column}'",
        if before > 0 {
            100.0 * removed as f64 / before as f64
        } else {
            0.0
        }
    );
    if filtered.is_empty() {
        bail!("Membership filter on '{column}' removed every row");
    }
    Ok(filtered)
}

/// Case-insensitive substring restriction (e.g. county selection). Selecting
/// the complete default list is the identity.
pub fn retain_by_substrings(
    frame: &Frame,
    column: &str,
    selected: &[String],
    all: &[String],
) -> Result<Frame> {
    if selected == all {
        return Ok(frame.clone());
    }
    if selected.is_empty() {
        bail!("Substring filter on '{column}' selected nothing");
    }
    let pattern = selected
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    let matcher = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("Compiling substring pattern for '{column}'"))?;
    let target = frame.require_column(column)?;
    let mask: Vec<bool> = target
        .values
        .iter()
        .map(|value| {
            value
                .as_ref()
                .is_some_and(|v| matcher.is_match(&v.as_display()))
        })
        .collect();
    let filtered = frame.retain_rows(&mask)?;
    if filtered.is_empty() {
        bail!("Substring filter on '{column}' removed every row");
    }
    Ok(filtered)
}
