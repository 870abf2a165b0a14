//! Process execution seam
//!
//! `Executor` is the one place the process boundary is crossed. The real
//! implementation spawns the tool with tokio; tests substitute a scripted one.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::common::{Error, Result};

/// A fully resolved process invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// The tool subcommand (first argument)
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }
}

/// What a finished process produced
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    /// stdout and stderr, interleaved by line in arrival order
    pub output: String,
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

/// Runs one invocation to completion
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<RawOutput>;
}

/// Spawns real processes
///
/// Children are killed when the future is dropped, so a caller-side timeout
/// aborts the in-flight process.
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor;

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<RawOutput> {
        let program = invocation.program.display().to_string();

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(&program, &[program.as_str()])
                } else {
                    Error::invocation_failed(&program, e)
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::invocation_failed(&program, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::invocation_failed(&program, "stderr not captured"))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let out_task = tokio::spawn(forward_lines(stdout, tx.clone()));
        let err_task = tokio::spawn(forward_lines(stderr, tx));

        let mut output = String::new();
        while let Some(line) = rx.recv().await {
            tracing::debug!(target: "plancheck::tool", "{}", line.trim_end());
            output.push_str(&line);
            if !line.ends_with('\n') {
                output.push('\n');
            }
        }
        // Both readers have hit EOF once the channel closes
        let _ = out_task.await;
        let _ = err_task.await;

        let status = child.wait().await?;

        Ok(RawOutput {
            output,
            exit_code: status.code(),
        })
    }
}

/// Send each line of `reader` to `tx` until EOF
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read tool output: {}", e);
                break;
            }
        }
    }
}
