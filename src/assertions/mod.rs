//! Assertion engine
//!
//! Evaluates declarative rules against captured tool output. Every rule is
//! checked; the result lists each violated rule in declaration order, so a
//! single run reports everything that is wrong.

mod pattern;

pub use pattern::Pattern;

use serde::{Deserialize, Serialize};
use std::fmt;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use pattern::Matcher;

/// Maximum output excerpt quoted in a violation message
const EXCERPT_LEN: usize = 120;

/// Opening line of a tags map in plan output, e.g. `+ tags = {`
static TAGS_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[\s+~-]*"?tags(_all)?"?\s*=\s*\{"#).expect("Invalid tags opener regex")
});

/// A single expectation about a scenario's outcome
///
/// In scenario files each rule is a one-key map such as
/// `- must_contain: aws_vpc.main`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "RuleRepr")]
pub enum AssertionRule {
    /// Output must match the pattern
    MustContain(Pattern),
    /// Output must not match the pattern
    MustNotContain(Pattern),
    /// Path, relative to the working directory, must exist
    FileExists(PathBuf),
    /// Key must appear as a tag assignment in the output
    TagPresent(String),
}

/// Scenario-file form of a rule: exactly one key set
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleRepr {
    must_contain: Option<Pattern>,
    must_not_contain: Option<Pattern>,
    file_exists: Option<PathBuf>,
    tag_present: Option<String>,
}

impl TryFrom<RuleRepr> for AssertionRule {
    type Error = String;

    fn try_from(repr: RuleRepr) -> Result<Self, Self::Error> {
        let mut rules = Vec::with_capacity(1);
        rules.extend(repr.must_contain.map(AssertionRule::MustContain));
        rules.extend(repr.must_not_contain.map(AssertionRule::MustNotContain));
        rules.extend(repr.file_exists.map(AssertionRule::FileExists));
        rules.extend(repr.tag_present.map(AssertionRule::TagPresent));
        match rules.len() {
            1 => Ok(rules.remove(0)),
            n => Err(format!(
                "a rule needs exactly one of must_contain, must_not_contain, file_exists, tag_present (found {})",
                n
            )),
        }
    }
}

impl AssertionRule {
    pub fn must_contain(pattern: impl Into<String>) -> Self {
        AssertionRule::MustContain(Pattern::literal(pattern))
    }

    pub fn must_not_contain(pattern: impl Into<String>) -> Self {
        AssertionRule::MustNotContain(Pattern::literal(pattern))
    }

    pub fn file_exists(path: impl Into<PathBuf>) -> Self {
        AssertionRule::FileExists(path.into())
    }

    pub fn tag_present(key: impl Into<String>) -> Self {
        AssertionRule::TagPresent(key.into())
    }

    /// Check that the rule itself is well formed (e.g. its regex compiles)
    pub fn check(&self) -> Result<(), String> {
        match self {
            AssertionRule::MustContain(p) | AssertionRule::MustNotContain(p) => {
                p.compile().map(|_| ())
            }
            AssertionRule::FileExists(path) if path.as_os_str().is_empty() => {
                Err("file_exists path is empty".to_string())
            }
            AssertionRule::TagPresent(key) if key.trim().is_empty() => {
                Err("tag_present key is empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for AssertionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionRule::MustContain(p) => write!(f, "must_contain({})", p),
            AssertionRule::MustNotContain(p) => write!(f, "must_not_contain({})", p),
            AssertionRule::FileExists(path) => write!(f, "file_exists({:?})", path.display().to_string()),
            AssertionRule::TagPresent(key) => write!(f, "tag_present({:?})", key),
        }
    }
}

/// A rule that did not hold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub rule: AssertionRule,
    pub message: String,
}

/// Evaluate `rules` against `output`, resolving file paths under `working_dir`
///
/// Returns the violated rules in declaration order; empty means all passed.
pub fn evaluate(output: &str, working_dir: &Path, rules: &[AssertionRule]) -> Vec<Violation> {
    rules
        .iter()
        .filter_map(|rule| {
            check_rule(output, working_dir, rule).err().map(|message| Violation {
                rule: rule.clone(),
                message,
            })
        })
        .collect()
}

fn check_rule(output: &str, working_dir: &Path, rule: &AssertionRule) -> Result<(), String> {
    match rule {
        AssertionRule::MustContain(pattern) => {
            let matcher = pattern.compile()?;
            if matcher.find(output).is_some() {
                Ok(())
            } else {
                Err(format!("expected output to contain {}", pattern))
            }
        }
        AssertionRule::MustNotContain(pattern) => {
            let matcher = pattern.compile()?;
            match matcher.find(output) {
                None => Ok(()),
                Some(at) => Err(format!(
                    "expected output not to contain {}, found at: {}",
                    pattern,
                    excerpt_line(output, at)
                )),
            }
        }
        AssertionRule::FileExists(path) => {
            let full = if path.is_relative() {
                working_dir.join(path)
            } else {
                path.clone()
            };
            if full.exists() {
                Ok(())
            } else {
                Err(format!("expected file '{}' to exist", path.display()))
            }
        }
        AssertionRule::TagPresent(key) => {
            let tag = Pattern::tag_key(key);
            let matcher = tag.compile()?;
            if in_tags_block(output, &matcher) {
                Ok(())
            } else {
                Err(format!("expected resources to carry tag '{}'", key))
            }
        }
    }
}

/// Whether `key` is assigned directly inside a `tags` or `tags_all` map
///
/// Handles both multi-line blocks and inline `tags = { Name = "x" }`.
fn in_tags_block(output: &str, key: &Matcher<'_>) -> bool {
    // Brace depth inside the current tags block; 0 means outside
    let mut depth = 0usize;
    for line in output.lines() {
        if depth == 0 {
            if let Some(m) = TAGS_OPENER.find(line) {
                let rest = &line[m.end()..];
                let inline = rest.split('}').next().unwrap_or("");
                if key.find(inline).is_some() {
                    return true;
                }
                depth = brace_delta(1, rest);
            }
            continue;
        }

        if depth == 1 && key.find(line).is_some() {
            return true;
        }
        depth = brace_delta(depth, line);
    }
    false
}

fn brace_delta(depth: usize, line: &str) -> usize {
    let opens = line.matches('{').count();
    let closes = line.matches('}').count();
    (depth + opens).saturating_sub(closes)
}

/// The line of `output` containing byte offset `at`, shortened
fn excerpt_line(output: &str, at: usize) -> String {
    let start = output[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = output[at..].find('\n').map(|i| at + i).unwrap_or(output.len());
    let line = output[start..end].trim();
    if line.chars().count() > EXCERPT_LEN {
        let short: String = line.chars().take(EXCERPT_LEN).collect();
        format!("'{}...'", short)
    } else {
        format!("'{}'", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VPC_PLAN: &str = r#"
Terraform will perform the following actions:

  # aws_subnet.public[0] will be created
  + resource "aws_subnet" "public" {
      + cidr_block = "10.0.1.0/24"
      + tags       = {
          + "Environment" = "test"
          + "Project"     = "test"
        }
    }

  # aws_vpc.main will be created
  + resource "aws_vpc" "main" {
      + cidr_block = "10.0.0.0/16"
      + tags       = {
          + ManagedBy = "terraform"
        }
    }

Plan: 2 to add, 0 to change, 0 to destroy.
"#;

    fn here() -> &'static Path {
        Path::new(".")
    }

    #[test]
    fn test_must_contain_literal() {
        let rules = vec![AssertionRule::must_contain("aws_vpc.main")];
        assert!(evaluate(VPC_PLAN, here(), &rules).is_empty());
    }

    #[test]
    fn test_must_not_contain_open_cidr() {
        let output = "ingress { cidr_blocks = [\"0.0.0.0/0\"] }";
        let rules = vec![AssertionRule::must_not_contain("0.0.0.0/0")];
        let violations = evaluate(output, here(), &rules);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules[0]);
        assert!(violations[0].message.contains("cidr_blocks"));
    }

    #[test]
    fn test_collects_all_violations_in_order() {
        let rules = vec![
            AssertionRule::must_contain("aws_subnet.private"),
            AssertionRule::must_contain("aws_vpc.main"),
            AssertionRule::must_contain("encryption"),
            AssertionRule::tag_present("Owner"),
        ];
        let violations = evaluate(VPC_PLAN, here(), &rules);
        let violated: Vec<&AssertionRule> = violations.iter().map(|v| &v.rule).collect();
        assert_eq!(violated, vec![&rules[0], &rules[2], &rules[3]]);

        // Deterministic on re-evaluation
        assert_eq!(evaluate(VPC_PLAN, here(), &rules), violations);
    }

    #[test]
    fn test_regex_pattern() {
        let rules = vec![
            AssertionRule::MustContain(Pattern::regex(r"Plan: \d+ to add")),
            AssertionRule::MustNotContain(Pattern::regex(r"[1-9]\d* to destroy")),
        ];
        let violations = evaluate(VPC_PLAN, here(), &rules);
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_regex_is_not_applied_to_literals() {
        // A literal dot must not match an arbitrary character
        let rules = vec![AssertionRule::must_contain("aws_vpc.main")];
        assert_eq!(evaluate("aws_vpc_main", here(), &rules).len(), 1);
    }

    #[test]
    fn test_invalid_regex_is_a_violation() {
        let rules = vec![AssertionRule::MustContain(Pattern::regex("aws_(vpc"))];
        let violations = evaluate(VPC_PLAN, here(), &rules);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("invalid regex"));
        assert!(rules[0].check().is_err());
    }

    #[test]
    fn test_tag_present_quoted_and_bare_keys() {
        let rules = vec![
            AssertionRule::tag_present("Environment"),
            AssertionRule::tag_present("Project"),
            AssertionRule::tag_present("ManagedBy"),
        ];
        assert!(evaluate(VPC_PLAN, here(), &rules).is_empty());
    }

    #[test]
    fn test_tag_present_ignores_non_assignments() {
        let output = "# Environment is not configured\nname = \"Environment\"\n";
        let rules = vec![AssertionRule::tag_present("Environment")];
        assert_eq!(evaluate(output, here(), &rules).len(), 1);
    }

    #[test]
    fn test_tag_present_requires_tags_block() {
        let output = r#"
  # aws_security_group.web will be created
  + resource "aws_security_group" "web" {
      + id   = (known after apply)
      + name = "web"
    }
"#;
        let rules = vec![AssertionRule::tag_present("name")];
        assert_eq!(evaluate(output, here(), &rules).len(), 1);
    }

    #[test]
    fn test_tag_present_ignores_keys_after_block_closes() {
        let output = "  + tags = {\n      + \"Team\" = \"net\"\n    }\n  + Environment = \"prod\"\n";
        let rules = vec![
            AssertionRule::tag_present("Team"),
            AssertionRule::tag_present("Environment"),
        ];
        let violations = evaluate(output, here(), &rules);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules[1]);
    }

    #[test]
    fn test_tag_present_inline_and_tags_all() {
        let inline = "  + tags = { Name = \"web\", Team = \"net\" }\n";
        assert!(evaluate(inline, here(), &[AssertionRule::tag_present("Team")]).is_empty());

        let tags_all = "      ~ tags_all = {\n          + \"CostCenter\" = \"42\"\n        }\n";
        assert!(evaluate(tags_all, here(), &[AssertionRule::tag_present("CostCenter")]).is_empty());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let rules = vec![AssertionRule::must_contain(""), AssertionRule::must_not_contain("")];
        assert!(rules.iter().all(|r| r.check().is_err()));
        assert_eq!(evaluate(VPC_PLAN, here(), &rules).len(), 2);
    }

    #[test]
    fn test_rule_needs_exactly_one_key() {
        let err = serde_yaml::from_str::<AssertionRule>("{ must_contain: a, tag_present: b }")
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
        let err = serde_yaml::from_str::<AssertionRule>("{ must_contian: a }").unwrap_err();
        assert!(err.to_string().contains("must_contian"));
    }

    #[test]
    fn test_file_exists_relative_to_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".terraform")).unwrap();
        std::fs::write(dir.path().join(".terraform/terraform.tfstate"), "{}").unwrap();

        let rules = vec![
            AssertionRule::file_exists(".terraform/terraform.tfstate"),
            AssertionRule::file_exists("state.tfstate"),
        ];
        let violations = evaluate("", dir.path(), &rules);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, AssertionRule::file_exists("state.tfstate"));
    }

    #[test]
    fn test_rules_from_yaml() {
        let rules: Vec<AssertionRule> = serde_yaml::from_str(
            r#"
- must_contain: aws_vpc.main
- must_not_contain:
    pattern: '0\.0\.0\.0/0'
    regex: true
- file_exists: .terraform/terraform.tfstate
- tag_present: Environment
"#,
        )
        .unwrap();
        assert_eq!(rules[0], AssertionRule::must_contain("aws_vpc.main"));
        assert_eq!(
            rules[1],
            AssertionRule::MustNotContain(Pattern::regex(r"0\.0\.0\.0/0"))
        );
        assert_eq!(
            rules[2],
            AssertionRule::file_exists(".terraform/terraform.tfstate")
        );
        assert_eq!(rules[3], AssertionRule::tag_present("Environment"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AssertionRule::must_contain("aws_vpc.main").to_string(),
            "must_contain(\"aws_vpc.main\")"
        );
        assert_eq!(
            AssertionRule::file_exists("state.tfstate").to_string(),
            "file_exists(\"state.tfstate\")"
        );
        assert_eq!(
            AssertionRule::MustContain(Pattern::regex("a+")).to_string(),
            "must_contain(/a+/)"
        );
    }
}
