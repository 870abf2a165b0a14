//! Scenario runner
//!
//! Loads YAML scenarios, runs each one through the tool's lifecycle in its
//! own workspace, and reports every violated expectation rather than just
//! the first.

mod config;
mod report;
mod runner;
mod suite;

pub use config::*;
pub use report::{Phase, ScenarioReport, SuiteReport};
pub use runner::{RunnerSettings, ScenarioRunner};
pub use suite::run_suite;
