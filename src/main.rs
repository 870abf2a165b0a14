//! plancheck - scenario-driven validation for infrastructure-as-code plans
//!
//! Runs an external provisioning tool through init, plan, apply and destroy
//! for each scenario and checks its output against declared expectations.

use clap::Parser;
use commands::Commands;
use plancheck::common::logging;
use plancheck::{cli, commands};

#[derive(Parser)]
#[command(name = "plancheck", about = "Scenario-driven validation for infrastructure-as-code plans")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let common = cli.command.common().clone();

    // Initialize logging
    let guard = match &common.log_file {
        Some(path) => match logging::init_with_file(common.verbose, path) {
            Ok(guard) => Some(guard),
            Err(e) => {
                logging::init_cli(common.verbose);
                tracing::warn!("Could not open log file '{}': {}", path.display(), e);
                None
            }
        },
        None => {
            logging::init_cli(common.verbose);
            None
        }
    };

    let code = match cli::dispatch(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    // Flush buffered log lines; process::exit skips destructors
    drop(guard);
    std::process::exit(code);
}
