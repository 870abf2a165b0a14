//! Scenario configuration types
//!
//! Defines the data structures for deserializing YAML scenario files. A file
//! holds either one scenario or a `scenarios:` list.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::assertions::AssertionRule;
use crate::common::{Error, Result};
use crate::invoker::{VarValue, Workspace};

/// What the scenario does after planning
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Init and plan only; nothing is provisioned
    #[default]
    PlanOnly,
    /// Apply the plan, then destroy during teardown
    PlanAndApply,
}

/// A complete scenario: configuration target, variables and rules
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Configuration directory, relative to the scenario file
    pub dir: PathBuf,
    /// Input variables passed as `-var`
    #[serde(default)]
    pub vars: BTreeMap<String, VarValue>,
    /// Variable files passed as `-var-file`, relative to the configuration
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// Backend settings passed to init as `-backend-config`
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
    /// Extra environment for every command
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Run `validate` between init and plan
    #[serde(default)]
    pub validate: bool,
    /// Copy the configuration into a private temporary directory
    #[serde(default = "default_true")]
    pub isolate: bool,
    /// Run `destroy` during teardown
    #[serde(default = "default_true")]
    pub destroy: bool,
    /// A failing plan is data to assert on, not a scenario failure
    #[serde(default)]
    pub allow_failure: bool,
    /// Retryable error substrings added to the configured list
    #[serde(default)]
    pub retryable_errors: Vec<String>,
    /// Deadline for init through apply; overrides the configured default
    pub timeout_secs: Option<u64>,
    /// Expectations evaluated against the captured output
    #[serde(default)]
    pub rules: Vec<AssertionRule>,
}

fn default_true() -> bool {
    true
}

/// Several scenarios in one file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ScenarioSuite {
    scenarios: Vec<ScenarioConfig>,
}

impl ScenarioConfig {
    /// A plan-only scenario against `dir` with no variables or rules
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: None,
            dir: dir.into(),
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            backend_config: BTreeMap::new(),
            env: BTreeMap::new(),
            mode: ExecutionMode::PlanOnly,
            validate: false,
            isolate: true,
            destroy: true,
            allow_failure: false,
            retryable_errors: Vec::new(),
            timeout_secs: None,
            rules: Vec::new(),
        }
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rules(mut self, rules: Vec<AssertionRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn validate_first(mut self) -> Self {
        self.validate = true;
        self
    }

    pub fn isolate(mut self, isolate: bool) -> Self {
        self.isolate = isolate;
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Check the scenario is runnable without invoking the tool
    pub fn check(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_scenario("<unnamed>", "name must not be empty"));
        }
        if !self.dir.is_dir() {
            return Err(Error::invalid_scenario(
                &self.name,
                format!("configuration directory '{}' does not exist", self.dir.display()),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::invalid_scenario(&self.name, "timeout_secs must be positive"));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            rule.check().map_err(|reason| {
                Error::invalid_scenario(&self.name, format!("rule {}: {}", i + 1, reason))
            })?;
        }
        Ok(())
    }

    /// Build this scenario's private workspace
    pub fn workspace(&self) -> Result<Workspace> {
        let ws = if self.isolate {
            Workspace::isolated(&self.name, &self.dir)?
        } else {
            Workspace::in_place(&self.name, &self.dir)?
        };
        Ok(ws
            .with_vars(self.vars.clone())
            .with_var_files(self.var_files.clone())
            .with_backend_config(self.backend_config.clone())
            .with_env(self.env.clone()))
    }

    /// Make the configuration directory absolute, relative to `base`
    fn resolve_paths(&mut self, base: &Path) {
        if self.dir.is_relative() {
            self.dir = base.join(&self.dir);
        }
    }
}

/// Load every scenario defined in a YAML file
///
/// Relative `dir` entries are resolved against the file's directory.
pub fn load_scenarios(path: &Path) -> Result<Vec<ScenarioConfig>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read scenario file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let base = path.parent().unwrap_or(Path::new("."));
    parse_scenarios(&content, base).map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parse scenario YAML, resolving relative paths against `base`
pub fn parse_scenarios(content: &str, base: &Path) -> Result<Vec<ScenarioConfig>> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse scenario file: {}", e)))?;

    let is_suite = value
        .as_mapping()
        .map(|m| m.contains_key("scenarios"))
        .unwrap_or(false);

    let mut scenarios = if is_suite {
        let suite: ScenarioSuite = serde_yaml::from_value(value)
            .map_err(|e| Error::Config(format!("Failed to parse scenarios: {}", e)))?;
        suite.scenarios
    } else {
        let scenario: ScenarioConfig = serde_yaml::from_value(value)
            .map_err(|e| Error::Config(format!("Failed to parse scenario: {}", e)))?;
        vec![scenario]
    };

    let mut seen = HashSet::new();
    for scenario in &mut scenarios {
        if !seen.insert(scenario.name.clone()) {
            return Err(Error::Config(format!(
                "Duplicate scenario name '{}'",
                scenario.name
            )));
        }
        scenario.resolve_paths(base);
    }

    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::Pattern;

    const SINGLE: &str = r#"
name: vpc-module
description: VPC plan contains the core network resources
dir: ../modules/vpc
vars:
  project_name: test
  vpc_cidr: 10.0.0.0/16
  availability_zones: [us-west-2a, us-west-2b]
rules:
  - must_contain: aws_vpc.main
  - must_contain: aws_subnet.public
"#;

    #[test]
    fn test_single_scenario_defaults() {
        let scenarios = parse_scenarios(SINGLE, Path::new("/repo/tests")).unwrap();
        assert_eq!(scenarios.len(), 1);
        let s = &scenarios[0];
        assert_eq!(s.name, "vpc-module");
        assert_eq!(s.dir, Path::new("/repo/tests/../modules/vpc"));
        assert_eq!(s.mode, ExecutionMode::PlanOnly);
        assert!(s.isolate);
        assert!(s.destroy);
        assert!(!s.validate);
        assert_eq!(s.rules.len(), 2);
        assert_eq!(s.vars["vpc_cidr"], VarValue::from("10.0.0.0/16"));
    }

    #[test]
    fn test_suite_file() {
        let yaml = r#"
scenarios:
  - name: security
    dir: /abs/environments/dev
    validate: true
    rules:
      - must_not_contain: 0.0.0.0/0
      - must_contain: encryption
  - name: state
    dir: environments/dev
    mode: plan-and-apply
    allow_failure: true
    timeout_secs: 60
    rules:
      - file_exists: .terraform/terraform.tfstate
"#;
        let scenarios = parse_scenarios(yaml, Path::new("/repo")).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].dir, Path::new("/abs/environments/dev"));
        assert!(scenarios[0].validate);
        assert_eq!(scenarios[1].dir, Path::new("/repo/environments/dev"));
        assert_eq!(scenarios[1].mode, ExecutionMode::PlanAndApply);
        assert!(scenarios[1].allow_failure);
        assert_eq!(scenarios[1].timeout_secs, Some(60));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "name: a\ndir: .\nrulez: []\n";
        let err = parse_scenarios(yaml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("rulez"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = "scenarios:\n  - name: a\n    dir: .\n  - name: a\n    dir: .\n";
        let err = parse_scenarios(yaml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("Duplicate scenario name 'a'"));
    }

    #[test]
    fn test_check_reports_bad_rule() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = ScenarioConfig::new("bad-regex", dir.path()).rules(vec![
            AssertionRule::must_contain("ok"),
            AssertionRule::MustContain(Pattern::regex("(")),
        ]);
        let err = scenario.check().unwrap_err();
        assert!(err.to_string().contains("rule 2"));
    }

    #[test]
    fn test_check_missing_dir() {
        let scenario = ScenarioConfig::new("missing", "/nonexistent/module");
        assert!(matches!(
            scenario.check(),
            Err(Error::InvalidScenario { .. })
        ));
    }

    #[test]
    fn test_load_file_with_every_rule_kind() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("modules/vpc")).unwrap();
        let file = dir.path().join("scenarios.yaml");
        std::fs::write(
            &file,
            r#"
scenarios:
  - name: vpc
    dir: modules/vpc
    vars:
      project_name: test
      instance_type: ~
    rules:
      - must_contain: aws_vpc.main
      - must_contain: { pattern: 'Plan: \d+ to add', regex: true }
      - must_not_contain: 0.0.0.0/0
      - must_not_contain:
          pattern: '[1-9]\d* to destroy'
          regex: true
      - file_exists: .terraform/terraform.tfstate
      - tag_present: Environment
"#,
        )
        .unwrap();

        let scenarios = load_scenarios(&file).unwrap();
        assert_eq!(scenarios.len(), 1);
        let s = &scenarios[0];
        assert_eq!(s.dir, dir.path().join("modules/vpc"));
        assert_eq!(s.vars["instance_type"], VarValue::Null);
        assert_eq!(
            s.rules,
            vec![
                AssertionRule::must_contain("aws_vpc.main"),
                AssertionRule::MustContain(Pattern::regex(r"Plan: \d+ to add")),
                AssertionRule::must_not_contain("0.0.0.0/0"),
                AssertionRule::MustNotContain(Pattern::regex(r"[1-9]\d* to destroy")),
                AssertionRule::file_exists(".terraform/terraform.tfstate"),
                AssertionRule::tag_present("Environment"),
            ]
        );
        assert!(s.check().is_ok());
    }

    #[test]
    fn test_malformed_rule_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.yaml");
        std::fs::write(&file, "name: a\ndir: .\nrules:\n  - must_contain: a\n    tag_present: b\n").unwrap();

        let err = load_scenarios(&file).unwrap_err().to_string();
        assert!(err.contains("bad.yaml"), "{}", err);
        assert!(err.contains("exactly one"), "{}", err);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_scenarios(Path::new("/nonexistent/scenario.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read scenario file"));
    }
}
