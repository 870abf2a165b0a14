//! Parallel suite execution
//!
//! Each scenario runs as its own task with its own workspace. A failing or
//! panicking scenario never stops its siblings from running and tearing down.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::config::ScenarioConfig;
use super::report::{ScenarioReport, SuiteReport};
use super::runner::ScenarioRunner;

/// Run all scenarios, at most `max_parallel` at a time
///
/// Reports come back in declaration order regardless of completion order.
pub async fn run_suite(
    runner: Arc<ScenarioRunner>,
    scenarios: Vec<ScenarioConfig>,
    max_parallel: usize,
    deadline: Option<Instant>,
) -> SuiteReport {
    warn_shared_directories(&scenarios);

    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(scenarios.len());

    for scenario in scenarios {
        let runner = Arc::clone(&runner);
        let permits = Arc::clone(&permits);
        let name = scenario.name.clone();
        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so acquire cannot fail
            let _permit = permits.acquire_owned().await.ok();
            runner.run(&scenario, deadline).await
        });
        handles.push((name, handle));
    }

    // Every task is already running; awaiting in order only fixes report order
    let mut reports = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let report = match handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(scenario = %name, "Scenario task failed: {}", e);
                ScenarioReport::aborted(name, format!("scenario task failed: {}", e))
            }
        };
        reports.push(report);
    }

    SuiteReport { scenarios: reports }
}

/// Non-isolated scenarios sharing a directory must be serialized by the caller
fn warn_shared_directories(scenarios: &[ScenarioConfig]) {
    let mut by_dir: HashMap<PathBuf, Vec<&str>> = HashMap::new();
    for scenario in scenarios.iter().filter(|s| !s.isolate) {
        let dir = scenario.dir.canonicalize().unwrap_or_else(|_| scenario.dir.clone());
        by_dir.entry(dir).or_default().push(&scenario.name);
    }
    for (dir, names) in by_dir.into_iter().filter(|(_, n)| n.len() > 1) {
        tracing::warn!(
            dir = %dir.display(),
            scenarios = ?names,
            "Non-isolated scenarios share a directory and may interfere when run in parallel"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::AssertionRule;
    use crate::invoker::testing::ScriptedExecutor;
    use crate::invoker::{PlanInvoker, RetryPolicy};
    use crate::scenario::runner::RunnerSettings;
    use crate::scenario::ExecutionMode;
    use std::time::Duration;

    fn runner(exec: Arc<ScriptedExecutor>) -> Arc<ScenarioRunner> {
        let invoker =
            PlanInvoker::with_executor(PathBuf::from("terraform"), RetryPolicy::none(), exec);
        Arc::new(ScenarioRunner::new(invoker, RunnerSettings::default()))
    }

    #[tokio::test]
    async fn test_reports_in_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new().reply("plan", 0, "aws_vpc.main\n"));
        let scenarios = vec![
            ScenarioConfig::new("first", dir.path())
                .rules(vec![AssertionRule::must_contain("aws_vpc.main")]),
            ScenarioConfig::new("second", dir.path())
                .rules(vec![AssertionRule::must_contain("aws_eks_cluster.main")]),
            ScenarioConfig::new("third", dir.path()),
        ];

        let suite = run_suite(runner(exec), scenarios, 2, None).await;

        let names: Vec<&str> = suite.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(suite.scenarios[0].passed);
        assert!(!suite.scenarios[1].passed);
        assert!(suite.scenarios[2].passed);
        assert_eq!(suite.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_failed_scenario_does_not_stop_siblings_teardown() {
        let good = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let scenarios = vec![
            ScenarioConfig::new("missing-dir", "/nonexistent/modules/eks"),
            ScenarioConfig::new("applied", good.path()).mode(ExecutionMode::PlanAndApply),
        ];

        let suite = run_suite(runner(exec.clone()), scenarios, 4, None).await;

        assert!(!suite.scenarios[0].passed);
        assert!(suite.scenarios[1].passed);
        assert_eq!(exec.count("destroy"), 1);
    }

    #[tokio::test]
    async fn test_all_passing_suite_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let scenarios = (0..5)
            .map(|i| ScenarioConfig::new(format!("s{}", i), dir.path()))
            .collect();

        let suite = run_suite(runner(exec.clone()), scenarios, 2, None).await;

        assert_eq!(suite.scenarios.len(), 5);
        assert_eq!(suite.exit_code(), 0);
        assert_eq!(exec.count("init"), 5);
    }

    #[tokio::test]
    async fn test_suite_deadline_applies_to_every_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new().slow(Duration::from_millis(400)));
        let scenarios = vec![
            ScenarioConfig::new("a", dir.path()),
            ScenarioConfig::new("b", dir.path()),
        ];

        let deadline = Instant::now() + Duration::from_millis(50);
        let suite = run_suite(runner(exec), scenarios, 2, Some(deadline)).await;

        assert!(suite
            .scenarios
            .iter()
            .all(|s| s.fatal.as_deref().unwrap_or("").contains("Deadline exceeded")));
    }
}
