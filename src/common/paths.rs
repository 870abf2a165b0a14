//! Configuration and scratch paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/plancheck/`
//! - macOS: `~/Library/Application Support/plancheck/`
//! - Windows: `%APPDATA%\plancheck\`

use std::path::PathBuf;

/// Application name used for directories and temp prefixes
const APP_NAME: &str = "plancheck";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Prefix for per-scenario temporary working directories
pub fn scratch_prefix(scenario: &str) -> String {
    let slug: String = scenario
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .take(32)
        .collect();
    format!("{}-{}-", APP_NAME, slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_scratch_prefix_is_filesystem_safe() {
        assert_eq!(scratch_prefix("VPC module/plan"), "plancheck-vpc-module-plan-");
    }
}
