//! CLI command definitions
//!
//! Defines the clap commands for the plancheck CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios and report every violated expectation
    Run {
        /// YAML scenario files (one scenario or a `scenarios:` list each)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Tool binary name or path (default: terraform)
        #[arg(long)]
        binary: Option<String>,

        /// Maximum number of scenarios running at once
        #[arg(long, short = 'j')]
        jobs: Option<usize>,

        /// Per-scenario deadline in seconds, init through apply
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// Deadline in seconds for the whole suite
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        deadline: Option<u64>,

        /// Only run scenarios whose name contains this string
        #[arg(long)]
        filter: Option<String>,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Parse and check scenario files without running the tool
    Check {
        /// YAML scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

/// Options shared by every command
#[derive(Args, Clone)]
pub struct CommonArgs {
    /// Configuration file (default: platform config dir/plancheck/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose output, including every line the tool prints
    #[arg(long, short)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Run { common, .. } | Commands::Check { common, .. } => common,
        }
    }
}
