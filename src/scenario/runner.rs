//! Scenario runner
//!
//! Drives one scenario through init, validate, plan and apply in strict
//! order, asserts on the captured output, and always tears down: destroy if
//! anything may have been provisioned, then removal of the private working
//! directory. Teardown runs exactly once on every exit path, including a
//! fatal lifecycle error and an expired deadline.

use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

use crate::assertions::evaluate;
use crate::common::{output_tail, Error, Result};
use crate::invoker::{PlanInvoker, RetryPolicy, ToolCommand, Workspace};

use super::config::{ExecutionMode, ScenarioConfig};
use super::report::{Phase, ScenarioReport};

/// Lines of tool output quoted in a fatal error message
const FATAL_TAIL_LINES: usize = 3;

/// Timing settings for every scenario
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Default deadline for init through apply; `None` means unbounded
    pub scenario_timeout: Option<Duration>,
    /// Time allowed for destroy during teardown
    pub teardown_timeout: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            scenario_timeout: None,
            teardown_timeout: Duration::from_secs(600),
        }
    }
}

/// What the lifecycle produced before it stopped
#[derive(Default)]
struct Progress {
    phases: Vec<Phase>,
    /// Plan output, plus apply output when applied
    captured: Option<String>,
    apply_attempted: bool,
}

/// Runs scenarios with a shared invoker
pub struct ScenarioRunner {
    invoker: PlanInvoker,
    settings: RunnerSettings,
}

impl ScenarioRunner {
    pub fn new(invoker: PlanInvoker, settings: RunnerSettings) -> Self {
        Self { invoker, settings }
    }

    /// Run a scenario to completion and report on it
    ///
    /// `deadline` bounds init through apply together with the scenario's own
    /// timeout, whichever is earlier. Never fails: every problem ends up in
    /// the report.
    pub async fn run(&self, scenario: &ScenarioConfig, deadline: Option<Instant>) -> ScenarioReport {
        let span = tracing::info_span!("scenario", name = %scenario.name);
        self.run_inner(scenario, deadline).instrument(span).await
    }

    async fn run_inner(&self, scenario: &ScenarioConfig, deadline: Option<Instant>) -> ScenarioReport {
        let started = Instant::now();
        let mut progress = Progress {
            phases: vec![Phase::Created],
            ..Progress::default()
        };

        let mut workspace = match scenario.workspace() {
            Ok(ws) => ws,
            Err(e) => {
                // Nothing acquired, so there is nothing to release
                tracing::error!("Failed to prepare workspace: {}", e);
                progress.phases.push(Phase::TornDown);
                return ScenarioReport::new(
                    scenario.name.clone(),
                    Vec::new(),
                    progress.phases,
                    Some(e.to_string()),
                    None,
                    started.elapsed(),
                );
            }
        };

        let policy = self
            .invoker
            .retry_policy()
            .with_extra_errors(&scenario.retryable_errors);
        let deadline = self.deadline_for(scenario, deadline);

        let mut expired = false;
        let lifecycle = self.drive(scenario, &mut workspace, &policy, &mut progress);
        let outcome = match deadline {
            // Dropping the lifecycle future kills the in-flight process
            Some(at) => match tokio::time::timeout_at(at, lifecycle).await {
                Ok(result) => result,
                Err(_) => {
                    expired = true;
                    Err(Error::DeadlineExceeded(started.elapsed()))
                }
            },
            None => lifecycle.await,
        };

        let mut violations = Vec::new();
        let fatal = match outcome {
            Ok(()) => None,
            Err(e) => {
                tracing::error!("Scenario stopped: {}", e);
                Some(describe(&e))
            }
        };

        if expired {
            tracing::warn!("Deadline passed, skipping assertions");
        } else if let Some(output) = &progress.captured {
            violations = evaluate(output, workspace.path(), &scenario.rules);
            progress.phases.push(Phase::Asserted);
            for v in &violations {
                tracing::info!(rule = %v.rule, "Violation: {}", v.message);
            }
        }

        let teardown_error = self
            .teardown(scenario, workspace, &policy, progress.apply_attempted)
            .await;
        progress.phases.push(Phase::TornDown);

        let report = ScenarioReport::new(
            scenario.name.clone(),
            violations,
            progress.phases,
            fatal,
            teardown_error,
            started.elapsed(),
        );
        tracing::info!(
            passed = report.passed,
            violations = report.violations.len(),
            "Scenario finished in {:?}",
            report.duration
        );
        report
    }

    /// Init, validate, plan and apply, stopping at the first fatal error
    async fn drive(
        &self,
        scenario: &ScenarioConfig,
        workspace: &mut Workspace,
        policy: &RetryPolicy,
        progress: &mut Progress,
    ) -> Result<()> {
        self.invoker
            .invoke_with(workspace, ToolCommand::Init, policy)
            .await?
            .into_success()?;
        progress.phases.push(Phase::Initialized);

        if scenario.validate {
            self.invoker
                .invoke_with(workspace, ToolCommand::Validate, policy)
                .await?
                .into_success()?;
            progress.phases.push(Phase::Validated);
        }

        let plan = self
            .invoker
            .invoke_with(workspace, ToolCommand::Plan, policy)
            .await?;
        progress.captured = Some(plan.output.clone());
        progress.phases.push(Phase::Planned);
        if !plan.success() {
            if scenario.allow_failure {
                tracing::info!(exit_code = ?plan.exit_code, "Plan failed; failure allowed, asserting on its output");
                return Ok(());
            }
            plan.into_success()?;
        }

        if scenario.mode == ExecutionMode::PlanAndApply {
            progress.apply_attempted = true;
            let apply = self
                .invoker
                .invoke_with(workspace, ToolCommand::Apply, policy)
                .await?;
            if let Some(captured) = progress.captured.as_mut() {
                captured.push_str(&apply.output);
            }
            apply.into_success()?;
            progress.phases.push(Phase::Applied);
        }

        Ok(())
    }

    /// Release everything the scenario acquired
    ///
    /// Takes the workspace by value, so it can only happen once.
    async fn teardown(
        &self,
        scenario: &ScenarioConfig,
        mut workspace: Workspace,
        policy: &RetryPolicy,
        apply_attempted: bool,
    ) -> Option<String> {
        let mut errors = Vec::new();

        if scenario.destroy && apply_attempted && workspace.is_initialized() {
            let destroy = self
                .invoker
                .invoke_with(&mut workspace, ToolCommand::Destroy, policy);
            match tokio::time::timeout(self.settings.teardown_timeout, destroy).await {
                Ok(Ok(result)) if result.success() => {}
                Ok(Ok(result)) => errors.push(format!(
                    "destroy exited with status {:?}: {}",
                    result.exit_code,
                    output_tail(&result.output, FATAL_TAIL_LINES).replace('\n', " | ")
                )),
                Ok(Err(e)) => errors.push(e.to_string()),
                Err(_) => errors.push(format!(
                    "destroy timed out after {:?}",
                    self.settings.teardown_timeout
                )),
            }
        }

        if let Err(e) = workspace.close() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            None
        } else {
            let err = Error::Teardown(errors.join("; "));
            tracing::warn!("{}", err);
            Some(err.to_string())
        }
    }

    fn deadline_for(&self, scenario: &ScenarioConfig, external: Option<Instant>) -> Option<Instant> {
        let own = scenario
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.settings.scenario_timeout)
            .map(|d| Instant::now() + d);
        match (own, external) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// One-line description of a fatal error, with the tail of any tool output
fn describe(err: &Error) -> String {
    match err.output() {
        Some(output) if !output.trim().is_empty() => format!(
            "{}: {}",
            err,
            output_tail(output.trim_end(), FATAL_TAIL_LINES).replace('\n', " | ")
        ),
        _ => err.to_string(),
    }
}
