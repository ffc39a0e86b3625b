use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{Granularity, JoinKind};

#[derive(Debug, Parser)]
#[command(author, version, about = "Build Irish residential building stocks from BER records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Standardize a BER extract and drop erroneous records
    Clean(CleanArgs),
    /// Build the full stock: clean BERs, fill 2016 census slots, archetype the gaps
    Stock(StockArgs),
    /// Compute the archetype table for one grouping of an existing stock
    Archetype(ArchetypeArgs),
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Input BER extract (CSV/TSV)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output file (.csv or .tsv)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Geographic key of the extract vocabulary
    #[arg(long, value_enum, default_value = "countyname")]
    pub granularity: Granularity,
    /// Pipeline configuration file (YAML); defaults are built in
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Restrict to these counties/postcodes (repeatable); default keeps all
    #[arg(long = "county", action = clap::ArgAction::Append)]
    pub counties: Vec<String>,
    /// Enable only these named filters (repeatable); default enables all
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// One-column file of valid small-area ids to restrict against
    #[arg(long = "small-area-ids")]
    pub small_area_ids: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Write a JSON run summary here
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StockArgs {
    #[command(flatten)]
    pub clean: CleanArgs,
    /// 2016 census building counts, one row per counted building slot
    #[arg(long)]
    pub census: PathBuf,
    /// Replace the census 'NS' period_built with the small-area mode
    #[arg(long = "replace-not-stated")]
    pub replace_not_stated: bool,
    /// Fill missing stock attributes from group archetypes
    #[arg(long)]
    pub archetype: bool,
    /// Minimum group population (strictly exceeded) for a trusted archetype
    #[arg(long = "sample-size")]
    pub sample_size: Option<usize>,
    /// How census slots join BER records
    #[arg(long, value_enum)]
    pub join: Option<JoinKind>,
}

#[derive(Debug, Args)]
pub struct ArchetypeArgs {
    /// Input building stock (CSV/TSV)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output archetype table (.csv or .tsv)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Grouping columns, comma-separated or repeated
    #[arg(long = "on", action = clap::ArgAction::Append, required = true)]
    pub on: Vec<String>,
    /// Minimum group population (strictly exceeded) for a trusted archetype
    #[arg(long = "sample-size")]
    pub sample_size: Option<usize>,
    /// Pipeline configuration file (YAML); defaults are built in
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => Err(format!("Unsupported delimiter '{other}'")),
    }
}
