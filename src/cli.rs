//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stitch static page assembler CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root; config and relative paths resolve against it
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: stitch.toml)
    #[arg(short = 'C', long, default_value = "stitch.toml")]
    pub config: PathBuf,

    /// Environment mode, overriding STITCH_ENV and [env].mode
    #[arg(short, long)]
    pub env: Option<String>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the whole pages tree, or only the given files
    Build {
        /// Files (or directories) under the pages root to rebuild
        files: Vec<PathBuf>,
    },

    /// Rebuild affected pages when sources change
    Watch,
}
