pub mod archetype;
pub mod census;
pub mod clean;
pub mod cli;
pub mod config;
pub mod data;
pub mod filter;
pub mod frame;
pub mod io_utils;
pub mod merge;
pub mod period;
pub mod report;
pub mod standardize;
pub mod stock;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("ber_stock", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Clean(args) => clean::execute(&args),
        Commands::Stock(args) => stock::execute(&args),
        Commands::Archetype(args) => archetype::execute(&args),
    }
}
