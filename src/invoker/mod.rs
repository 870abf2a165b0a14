//! Plan invoker
//!
//! Drives the external infrastructure tool through its command-line
//! contract: builds the arguments for each lifecycle command, runs it in the
//! scenario's workspace, captures combined output, and re-runs commands that
//! fail with a transient error.

mod executor;
mod retry;
mod vars;
mod workspace;

pub use executor::{Executor, Invocation, ProcessExecutor, RawOutput};
pub use retry::RetryPolicy;
pub use vars::{var_args, VarValue};
pub use workspace::Workspace;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{Error, Result};

/// Lifecycle commands understood by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCommand {
    Init,
    Validate,
    Plan,
    Apply,
    Destroy,
}

impl ToolCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCommand::Init => "init",
            ToolCommand::Validate => "validate",
            ToolCommand::Plan => "plan",
            ToolCommand::Apply => "apply",
            ToolCommand::Destroy => "destroy",
        }
    }

    /// Whether the workspace must have been initialized first
    pub fn requires_init(&self) -> bool {
        !matches!(self, ToolCommand::Init)
    }

    /// Full argument list for this command in `workspace`
    pub fn args(&self, workspace: &Workspace) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            ToolCommand::Init => {
                args.push("-input=false".to_string());
                args.push("-no-color".to_string());
                args.extend(workspace.backend_args());
            }
            ToolCommand::Validate => {
                args.push("-no-color".to_string());
            }
            ToolCommand::Plan => {
                args.push("-input=false".to_string());
                args.push("-no-color".to_string());
                args.extend(workspace.variable_args());
            }
            ToolCommand::Apply | ToolCommand::Destroy => {
                args.push("-input=false".to_string());
                args.push("-auto-approve".to_string());
                args.push("-no-color".to_string());
                args.extend(workspace.variable_args());
            }
        }
        args
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one command, after retries
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: ToolCommand,
    /// Combined output of the final attempt, untruncated
    pub output: String,
    /// Exit code of the final attempt; `None` if killed by a signal
    pub exit_code: Option<i32>,
    /// Wall-clock time across all attempts, including backoff
    pub duration: Duration,
    pub attempts: u32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a failed run into `Error::NonZeroExit` carrying its output
    pub fn into_success(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::NonZeroExit {
                command: self.command,
                code: self.exit_code,
                output: self.output,
            })
        }
    }
}

/// Runs lifecycle commands for a workspace
#[derive(Clone)]
pub struct PlanInvoker {
    program: PathBuf,
    executor: Arc<dyn Executor>,
    retry: RetryPolicy,
}

impl PlanInvoker {
    /// Invoker spawning real processes of `program`
    pub fn new(program: PathBuf, retry: RetryPolicy) -> Self {
        Self::with_executor(program, retry, Arc::new(ProcessExecutor))
    }

    pub fn with_executor(program: PathBuf, retry: RetryPolicy, executor: Arc<dyn Executor>) -> Self {
        Self {
            program,
            executor,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `command` with the invoker's own retry policy
    pub async fn invoke(
        &self,
        workspace: &mut Workspace,
        command: ToolCommand,
    ) -> Result<ExecutionResult> {
        let policy = self.retry.clone();
        self.invoke_with(workspace, command, &policy).await
    }

    /// Run `command`, retrying transient failures per `policy`
    ///
    /// A non-zero exit is returned as `Ok` data; only failure to run the
    /// process at all (or a missing init) is an `Err`.
    pub async fn invoke_with(
        &self,
        workspace: &mut Workspace,
        command: ToolCommand,
        policy: &RetryPolicy,
    ) -> Result<ExecutionResult> {
        if command.requires_init() && !workspace.is_initialized() {
            return Err(Error::NotInitialized(command));
        }

        let invocation = Invocation {
            program: self.program.clone(),
            args: command.args(workspace),
            working_dir: workspace.path().to_path_buf(),
            env: workspace.env(),
        };

        tracing::info!(
            command = %command,
            workdir = %workspace.path().display(),
            "Running {} {}",
            self.program.display(),
            invocation.args.join(" ")
        );

        let started = Instant::now();
        let mut attempt = 1;
        let raw = loop {
            let raw = self.executor.execute(&invocation).await?;
            if raw.exit_code == Some(0) || !policy.should_retry(attempt, &raw.output) {
                break raw;
            }

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                command = %command,
                attempt,
                matched = policy.matching_error(&raw.output).unwrap_or_default(),
                "Retryable error, retrying in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        };

        let result = ExecutionResult {
            command,
            output: raw.output,
            exit_code: raw.exit_code,
            duration: started.elapsed(),
            attempts: attempt,
        };

        if command == ToolCommand::Init && result.success() {
            workspace.mark_initialized();
        }

        tracing::debug!(
            command = %command,
            exit_code = ?result.exit_code,
            attempts = result.attempts,
            elapsed = ?result.duration,
            "Command finished"
        );

        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor for unit tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replies per subcommand; unscripted subcommands succeed with no output.
    /// Each subcommand's replies are consumed in order, the last one repeating.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        replies: Mutex<HashMap<String, Vec<RawOutput>>>,
        pub calls: Mutex<Vec<Invocation>>,
        delay: Option<Duration>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, subcommand: &str, exit_code: i32, output: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(subcommand.to_string())
                .or_default()
                .push(RawOutput {
                    output: output.to_string(),
                    exit_code: Some(exit_code),
                });
            self
        }

        /// Make every call take at least `delay`
        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn subcommands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.subcommand().to_string())
                .collect()
        }

        pub fn count(&self, subcommand: &str) -> usize {
            self.subcommands().iter().filter(|s| *s == subcommand).count()
        }
    }

    #[async_trait::async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, invocation: &Invocation) -> Result<RawOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut replies = self.replies.lock().unwrap();
            let reply = match replies.get_mut(invocation.subcommand()) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) if queue.len() == 1 => queue[0].clone(),
                _ => RawOutput {
                    output: String::new(),
                    exit_code: Some(0),
                },
            };
            Ok(reply)
        }
    }
}
