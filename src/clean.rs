//! The `clean` subcommand: standardize a BER extract and drop erroneous
//! records.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::info;

use crate::cli::CleanArgs;
use crate::config::PipelineConfig;
use crate::filter::{self, FilterOutcome};
use crate::frame::Frame;
use crate::io_utils;
use crate::report::{self, RunSummary};
use crate::standardize;

pub fn execute(args: &CleanArgs) -> Result<()> {
    let config = load_config(args)?;
    io_utils::ensure_supported_output(&args.output)?;
    let bers = load_standardized_bers(args, &config)?;
    let input_rows = bers.n_rows();
    let (cleaned, outcomes) = clean_bers(&bers, args, &config)?;
    io_utils::write_frame(&args.output, &cleaned, args.delimiter)?;
    info!(
        "Cleaned {} of {} BER record(s) into {:?}",
        cleaned.n_rows(),
        input_rows,
        args.output
    );
    if let Some(summary_path) = &args.summary {
        let summary = RunSummary {
            input_rows,
            filters: outcomes,
            output_rows: cleaned.n_rows(),
            ..RunSummary::default()
        };
        report::write_summary(summary_path, &summary)?;
    }
    Ok(())
}

pub fn load_config(args: &CleanArgs) -> Result<PipelineConfig> {
    match &args.config {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}

/// Reads the BER extract and renames/types it into the canonical vocabulary
/// for the requested granularity.
pub fn load_standardized_bers(args: &CleanArgs, config: &PipelineConfig) -> Result<Frame> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let mut bers = io_utils::read_frame(&args.input, delimiter, encoding)
        .with_context(|| format!("Loading BER extract {:?}", args.input))?;
    let mapping = config.mappings.for_granularity(args.granularity);
    standardize::standardize(&mut bers, mapping, config)
        .with_context(|| format!("Standardizing {:?}", args.input))?;
    Ok(bers)
}

/// The cleaning chain: county restriction, then the named validity filters,
/// then (optionally) the valid-small-area-id restriction.
pub fn clean_bers(
    bers: &Frame,
    args: &CleanArgs,
    config: &PipelineConfig,
) -> Result<(Frame, Vec<FilterOutcome>)> {
    let selected_counties = if args.counties.is_empty() {
        config.countynames.clone()
    } else {
        args.counties.clone()
    };
    let in_counties = filter::retain_by_substrings(
        bers,
        "countyname",
        &selected_counties,
        &config.countynames,
    )?;

    let conditions = filter::standard_conditions(config);
    let selected_filters = if args.filters.is_empty() {
        filter::condition_names(&conditions)
    } else {
        args.filters.clone()
    };
    let (filtered, outcomes) = filter::apply_conditions(
        &in_counties,
        &conditions,
        &selected_filters,
        config.missing_column,
    )?;

    let cleaned = match &args.small_area_ids {
        Some(path) => {
            let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
            let ids: HashSet<String> = io_utils::read_id_list(path, None, encoding)
                .with_context(|| format!("Loading small-area ids {path:?}"))?
                .into_iter()
                .collect();
            filter::retain_by_membership(&filtered, "small_area", &ids, config.missing_column)?
        }
        None => filtered,
    };
    Ok((cleaned, outcomes))
}
