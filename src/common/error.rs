//! Error types for plancheck
//!
//! Messages are meant to be read in a CI log, so they name the scenario,
//! command or file involved and, where it helps, what to do about it.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::invoker::ToolCommand;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for plancheck
#[derive(Error, Debug)]
pub enum Error {
    // === Invocation Errors ===
    #[error("Tool '{name}' not found. Searched: {searched}. Set [tool] binary in the config or pass --binary")]
    ToolNotFound { name: String, searched: String },

    #[error("Failed to start '{program}': {reason}")]
    InvocationFailed { program: String, reason: String },

    #[error("'{command}' exited with status {}", code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    NonZeroExit {
        command: ToolCommand,
        code: Option<i32>,
        output: String,
    },

    #[error("'{0}' requires a successful 'init' on the same workspace first")]
    NotInitialized(ToolCommand),

    // === Lifecycle Errors ===
    #[error("Deadline exceeded after {0:?}; in-flight process aborted")]
    DeadlineExceeded(Duration),

    #[error("Teardown failed: {0}")]
    Teardown(String),

    // === Scenario Errors ===
    #[error("Invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a tool not found error with search paths
    pub fn tool_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::ToolNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create an invocation failed error
    pub fn invocation_failed(program: &str, reason: impl ToString) -> Self {
        Self::InvocationFailed {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid scenario error
    pub fn invalid_scenario(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidScenario {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the external process could not be started
    pub fn is_invocation_error(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. } | Self::InvocationFailed { .. })
    }

    /// Captured tool output carried by the error, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_lists_search_paths() {
        let err = Error::tool_not_found("terraform", &["/usr/bin", "/usr/local/bin"]);
        let msg = err.to_string();
        assert!(msg.contains("'terraform'"));
        assert!(msg.contains("/usr/bin, /usr/local/bin"));
        assert!(err.is_invocation_error());
    }

    #[test]
    fn test_non_zero_exit_carries_output() {
        let err = Error::NonZeroExit {
            command: ToolCommand::Plan,
            code: Some(1),
            output: "Error: Invalid reference".to_string(),
        };
        assert_eq!(err.to_string(), "'plan' exited with status 1");
        assert_eq!(err.output(), Some("Error: Invalid reference"));
        assert!(!err.is_invocation_error());
    }

    #[test]
    fn test_non_zero_exit_without_code() {
        let err = Error::NonZeroExit {
            command: ToolCommand::Apply,
            code: None,
            output: String::new(),
        };
        assert_eq!(err.to_string(), "'apply' exited with status unknown");
    }
}
