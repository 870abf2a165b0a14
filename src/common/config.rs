//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};
use crate::invoker::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// External tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Retry settings for transient tool failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Scenario runner settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// External tool settings
#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    /// Binary name (looked up on PATH) or path to the binary
    #[serde(default = "default_binary")]
    pub binary: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
        }
    }
}

fn default_binary() -> String {
    "terraform".to_string()
}

/// Retry settings
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Total attempts per command, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on every further retry
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Output substrings that mark a failure as transient
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            retryable_errors: default_retryable_errors(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    5_000
}
fn default_max_delay() -> u64 {
    60_000
}

/// Transient failures seen from cloud APIs and provider registries
fn default_retryable_errors() -> Vec<String> {
    [
        "RequestLimitExceeded",
        "Throttling",
        "TooManyRequestsException",
        "429 Too Many Requests",
        "connection reset by peer",
        "TLS handshake timeout",
        "Client.Timeout exceeded while awaiting headers",
        "Error installing provider",
        "Failed to query available provider packages",
        "could not query provider registry",
        "timeout while waiting for plugin to start",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl RetryConfig {
    /// Build the invoker's retry policy from these settings
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            retryable_errors: self.retryable_errors.clone(),
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Scenario runner settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Maximum number of scenarios running at once
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Default per-scenario deadline, covering init through apply; 0 disables it
    #[serde(default = "default_scenario_timeout")]
    pub scenario_timeout_secs: u64,

    /// Time allowed for destroy during teardown
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            scenario_timeout_secs: default_scenario_timeout(),
            teardown_timeout_secs: default_teardown_timeout(),
        }
    }
}

impl RunnerConfig {
    /// The default scenario deadline, `None` when disabled
    pub fn scenario_timeout(&self) -> Option<Duration> {
        (self.scenario_timeout_secs > 0).then(|| Duration::from_secs(self.scenario_timeout_secs))
    }
}

fn default_max_parallel() -> usize {
    4
}
fn default_scenario_timeout() -> u64 {
    1_800
}
fn default_teardown_timeout() -> u64 {
    600
}

impl Config {
    /// Load configuration from an explicit file, or the default config file
    ///
    /// Returns default configuration if no explicit file is given and the
    /// default file doesn't exist
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Resolve the tool binary
    ///
    /// A value containing a path separator is used as a path; anything else
    /// is searched on PATH
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        let binary = &self.tool.binary;
        let as_path = Path::new(binary);
        if as_path.components().count() > 1 {
            if as_path.exists() {
                return Ok(as_path.to_path_buf());
            }
            return Err(Error::tool_not_found(binary, &[binary.as_str()]));
        }

        which::which(binary).map_err(|_| {
            let searched: Vec<String> = std::env::var_os("PATH")
                .map(|p| {
                    std::env::split_paths(&p)
                        .map(|d| d.display().to_string())
                        .collect()
                })
                .unwrap_or_default();
            Error::tool_not_found(binary, &searched)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tool.binary, "terraform");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config
            .retry
            .retryable_errors
            .iter()
            .any(|e| e == "RequestLimitExceeded"));
        assert_eq!(config.runner.max_parallel, 4);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[tool]
binary = "tofu"

[retry]
max_attempts = 5
"#,
        )
        .unwrap();
        assert_eq!(config.tool.binary, "tofu");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 5_000);
        assert_eq!(config.runner.teardown_timeout_secs, 600);
    }

    #[test]
    fn test_zero_scenario_timeout_disables_deadline() {
        let config: Config = toml::from_str("[runner]\nscenario_timeout_secs = 0\n").unwrap();
        assert_eq!(config.runner.scenario_timeout(), None);
        assert_eq!(
            RunnerConfig::default().scenario_timeout(),
            Some(Duration::from_secs(1_800))
        );
    }

    #[test]
    fn test_policy_never_has_zero_attempts() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(retry.policy().max_attempts, 1);
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/plancheck.toml"))).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_resolve_missing_path_binary() {
        let config = Config {
            tool: ToolConfig {
                binary: "/nonexistent/bin/terraform".to_string(),
            },
            ..Config::default()
        };
        assert!(matches!(
            config.resolve_binary(),
            Err(Error::ToolNotFound { .. })
        ));
    }
}
