//! # Main — CLI Entry Point
//!
//! A thin binary over the `metricgrid` library: sets up logging and the
//! global allocator, parses arguments, and delegates each subcommand's
//! body to `cli.rs`.

mod cli;

use anyhow::Result;
use clap::Parser;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let rt = tokio::runtime::Runtime::new()?;
    match &cli.command {
        Commands::Plan { .. } => rt.block_on(cli::run_plan(&cli)),
        Commands::ArchiveLs { .. } => rt.block_on(cli::run_archive_ls(&cli)),
        Commands::ArchiveShow { .. } => rt.block_on(cli::run_archive_show(&cli)),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
