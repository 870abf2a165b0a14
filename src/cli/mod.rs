//! CLI command handling
//!
//! Loads configuration and scenarios, runs the suite and formats output.

use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::invoker::PlanInvoker;
use crate::scenario::{load_scenarios, run_suite, RunnerSettings, ScenarioConfig, ScenarioRunner};

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            paths,
            binary,
            jobs,
            timeout,
            deadline,
            filter,
            json,
            common,
        } => {
            let mut config = Config::load(common.config.as_deref())?;
            if let Some(binary) = binary {
                config.tool.binary = binary;
            }
            if let Some(jobs) = jobs {
                config.runner.max_parallel = jobs;
            }
            if let Some(timeout) = timeout {
                config.runner.scenario_timeout_secs = timeout;
            }

            let mut scenarios = load_all(&paths)?;
            if let Some(filter) = &filter {
                scenarios.retain(|s| s.name.contains(filter.as_str()));
            }
            if scenarios.is_empty() {
                return Err(Error::Config("No scenarios to run".to_string()));
            }

            let invalid: Vec<Error> = scenarios.iter().filter_map(|s| s.check().err()).collect();
            if !invalid.is_empty() {
                for err in &invalid {
                    eprintln!("  {} {}", "✗".red(), err);
                }
                return Err(Error::Config(format!(
                    "{} invalid scenario(s); nothing was run",
                    invalid.len()
                )));
            }

            let program = config.resolve_binary()?;
            let invoker = PlanInvoker::new(program.clone(), config.retry.policy());
            let settings = RunnerSettings {
                scenario_timeout: config.runner.scenario_timeout(),
                teardown_timeout: Duration::from_secs(config.runner.teardown_timeout_secs),
            };
            let runner = Arc::new(ScenarioRunner::new(invoker, settings));
            let deadline = deadline.map(|secs| Instant::now() + Duration::from_secs(secs));

            if !json {
                println!(
                    "\n{} {} scenario(s) with {}",
                    "Running:".blue().bold(),
                    scenarios.len(),
                    program.display().to_string().white().bold()
                );
            }

            let report = run_suite(runner, scenarios, config.runner.max_parallel, deadline).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print();
            }

            Ok(report.exit_code())
        }

        Commands::Check { paths, .. } => {
            let scenarios = load_all(&paths)?;
            let mut failed = 0;
            for scenario in &scenarios {
                match scenario.check() {
                    Ok(()) => println!(
                        "  {} {} {}",
                        "✓".green(),
                        scenario.name.white().bold(),
                        format!("({} rules)", scenario.rules.len()).dimmed()
                    ),
                    Err(e) => {
                        failed += 1;
                        println!("  {} {}", "✗".red(), e);
                    }
                }
            }

            if failed == 0 {
                println!("\n{} scenario(s) OK", scenarios.len());
                Ok(0)
            } else {
                println!("\n{} of {} scenario(s) invalid", failed, scenarios.len());
                Ok(1)
            }
        }
    }
}

/// Load every scenario from every file, rejecting duplicate names
fn load_all(paths: &[PathBuf]) -> Result<Vec<ScenarioConfig>> {
    let mut scenarios: Vec<ScenarioConfig> = Vec::new();
    for path in paths {
        for scenario in load_scenarios(path)? {
            if scenarios.iter().any(|s| s.name == scenario.name) {
                return Err(Error::Config(format!(
                    "Duplicate scenario name '{}' in '{}'",
                    scenario.name,
                    path.display()
                )));
            }
            scenarios.push(scenario);
        }
    }
    Ok(scenarios)
}
