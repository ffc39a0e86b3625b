//! The `stock` subcommand: the full merge-and-archetype pipeline.
//!
//! Clean BERs, fill the 2016 census building slots with them positionally,
//! then (optionally) impute the remaining attribute gaps from group
//! archetypes. The census side is the row-count oracle: every counted slot
//! appears in the output exactly once under a left join.

use anyhow::{Context, Result};
use log::info;

use crate::archetype;
use crate::census;
use crate::cli::StockArgs;
use crate::clean;
use crate::io_utils;
use crate::merge;
use crate::period::PERIOD_BUILT;
use crate::report::{self, RunSummary};
use crate::standardize;

pub fn execute(args: &StockArgs) -> Result<()> {
    let config = clean::load_config(&args.clean)?;
    io_utils::ensure_supported_output(&args.clean.output)?;

    let bers = clean::load_standardized_bers(&args.clean, &config)?;
    let input_rows = bers.n_rows();
    let (cleaned_bers, filter_outcomes) = clean::clean_bers(&bers, &args.clean, &config)?;

    let delimiter = io_utils::resolve_input_delimiter(&args.census, args.clean.delimiter);
    let encoding = io_utils::resolve_encoding(args.clean.input_encoding.as_deref())?;
    let mut census_stock = io_utils::read_frame(&args.census, delimiter, encoding)
        .with_context(|| format!("Loading census building counts {:?}", args.census))?;
    standardize::standardize(&mut census_stock, &Default::default(), &config)
        .with_context(|| format!("Standardizing {:?}", args.census))?;

    if !args.clean.counties.is_empty() {
        census_stock = census::extract_rows_in_countynames(&census_stock, &args.clean.counties)?;
    }
    if args.replace_not_stated {
        census_stock = census::replace_not_stated_period_built(&census_stock)
            .context("Replacing 'Not Stated' period_built")?;
    }

    let join = args.join.unwrap_or(config.join);
    let (mut stock, diagnostics) = merge::fill_census_with_bers(
        &census_stock,
        &cleaned_bers,
        args.clean.granularity,
        join,
    )?;

    let mut archetype_passes = Vec::new();
    if args.archetype {
        let sample_size = args.sample_size.unwrap_or(config.sample_size);
        let keysets = vec![
            vec![
                args.clean.granularity.column().to_string(),
                PERIOD_BUILT.to_string(),
            ],
            vec![PERIOD_BUILT.to_string()],
        ];
        let (filled, passes) = archetype::apply_archetypes(
            &stock,
            &keysets,
            &archetype::default_exclude_columns(),
            sample_size,
        )?;
        stock = filled;
        archetype_passes = passes;
    }

    io_utils::write_frame(&args.clean.output, &stock, args.clean.delimiter)?;
    info!(
        "Wrote building stock of {} row(s) to {:?}",
        stock.n_rows(),
        args.clean.output
    );
    if let Some(summary_path) = &args.clean.summary {
        let summary = RunSummary {
            input_rows,
            filters: filter_outcomes,
            merge: Some(diagnostics),
            archetype_passes,
            output_rows: stock.n_rows(),
        };
        report::write_summary(summary_path, &summary)?;
    }
    Ok(())
}
