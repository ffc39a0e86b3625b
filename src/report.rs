//! Machine-readable run summary.
//!
//! The spec-level diagnostics — per-filter removal shares, join cardinality
//! losses, archetype pass yields — are collected into one JSON document so a
//! caller can audit what a run did to the data without scraping logs.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::archetype::ArchetypePassSummary;
use crate::filter::FilterOutcome;
use crate::merge::MergeDiagnostics;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub input_rows: usize,
    pub filters: Vec<FilterOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeDiagnostics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub archetype_passes: Vec<ArchetypePassSummary>,
    pub output_rows: usize,
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating summary file {path:?}"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)
        .with_context(|| format!("Writing summary to {path:?}"))?;
    Ok(())
}
