//! Scenario and suite reports
//!
//! Reports are built once at the end of a run and never modified. They print
//! as colored text for terminals and serialize to JSON for tooling.

use colored::Colorize;
use serde::Serialize;
use std::time::Duration;

use crate::assertions::Violation;

/// Lifecycle phases a scenario moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    Initialized,
    Validated,
    Planned,
    Applied,
    Asserted,
    TornDown,
}

/// Outcome of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    /// Violated rules, in declaration order
    pub violations: Vec<Violation>,
    /// Phases reached, in order
    pub phases: Vec<Phase>,
    /// Error that stopped the lifecycle early, if any
    pub fatal: Option<String>,
    /// Cleanup problem; reported but does not affect `passed`
    pub teardown_error: Option<String>,
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().try_into().unwrap_or(u64::MAX))
}

impl ScenarioReport {
    pub fn new(
        name: String,
        violations: Vec<Violation>,
        phases: Vec<Phase>,
        fatal: Option<String>,
        teardown_error: Option<String>,
        duration: Duration,
    ) -> Self {
        let passed = fatal.is_none() && violations.is_empty();
        Self {
            name,
            passed,
            violations,
            phases,
            fatal,
            teardown_error,
            duration,
        }
    }

    /// Report for a scenario whose task died before producing a report
    pub fn aborted(name: String, reason: String) -> Self {
        Self::new(name, Vec::new(), vec![Phase::Created], Some(reason), None, Duration::ZERO)
    }

    pub fn reached(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    /// Print the scenario outcome
    pub fn print(&self) {
        if self.passed {
            println!(
                "  {} {} {}",
                "✓".green(),
                self.name.white().bold(),
                format!("({:.1}s)", self.duration.as_secs_f64()).dimmed()
            );
        } else {
            println!(
                "  {} {} {}",
                "✗".red(),
                self.name.white().bold(),
                format!("({:.1}s)", self.duration.as_secs_f64()).dimmed()
            );
        }

        if let Some(fatal) = &self.fatal {
            println!("      {} {}", "error:".red(), fatal);
        }
        for violation in &self.violations {
            println!(
                "      {} {}: {}",
                "violated".red(),
                violation.rule.to_string().yellow(),
                violation.message
            );
        }
        if let Some(teardown) = &self.teardown_error {
            println!("      {} {}", "teardown:".yellow(), teardown);
        }
    }
}

/// Outcome of a set of scenarios, in declaration order
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| !s.passed).count()
    }

    /// 0 if every scenario passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// Print every scenario and a summary line
    pub fn print(&self) {
        println!("\n{}", "Results:".cyan());
        for scenario in &self.scenarios {
            scenario.print();
        }

        let total = self.scenarios.len();
        let failed = self.failed_count();
        if failed == 0 {
            println!(
                "\n{} {}\n",
                "✓".green().bold(),
                format!("{} of {} scenarios passed", total, total).green().bold()
            );
        } else {
            println!(
                "\n{} {}\n",
                "✗".red().bold(),
                format!("{} of {} scenarios failed", failed, total).red().bold()
            );
        }
    }
}
