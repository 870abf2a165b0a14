//! Common utilities shared by the invoker, runner and CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Keep the last `max_lines` lines of tool output for a failure message.
///
/// Full output stays in the report; this is only for one-line summaries.
pub fn output_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
