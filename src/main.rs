//! Stitch - a static page assembler with partials, tokens and per-path rules.

mod build;
mod cli;
mod compiler;
mod config;
mod logger;
mod utils;
mod watch;

use anyhow::Result;
use build::build_site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use watch::watch_for_changes_blocking;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        log!("error"; "{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = SiteConfig::load(cli)?;

    match &cli.command {
        Commands::Build { files } => build_site(&config, files),
        Commands::Watch => watch_for_changes_blocking(&config),
    }
}
