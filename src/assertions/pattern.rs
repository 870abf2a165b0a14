//! Output patterns: literal substrings or regular expressions

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pattern to search for in tool output
///
/// In scenario files a bare string is a literal; `{ pattern, regex: true }`
/// is a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PatternRepr")]
pub struct Pattern {
    pub pattern: String,
    pub regex: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Literal(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        regex: bool,
    },
}

impl From<PatternRepr> for Pattern {
    fn from(repr: PatternRepr) -> Self {
        match repr {
            PatternRepr::Literal(pattern) => Pattern {
                pattern,
                regex: false,
            },
            PatternRepr::Detailed { pattern, regex } => Pattern { pattern, regex },
        }
    }
}

/// A compiled pattern
pub enum Matcher<'a> {
    Literal(&'a str),
    Regex(Regex),
}

impl Matcher<'_> {
    /// Byte offset of the first match
    pub fn find(&self, haystack: &str) -> Option<usize> {
        match self {
            Matcher::Literal(needle) => haystack.find(needle),
            Matcher::Regex(re) => re.find(haystack).map(|m| m.start()),
        }
    }
}

impl Pattern {
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            regex: false,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            regex: true,
        }
    }

    /// Pattern for `key` being assigned as a map key
    ///
    /// Matches entries such as `+ "Environment" = "test"`,
    /// `~ Project = "a" -> "b"` or the `Name = "x"` in `{ Name = "x" }`.
    /// Whether the map is a tags map is up to the caller.
    pub fn tag_key(key: &str) -> Self {
        Self::regex(format!(
            r#"(?:^|[\s{{,])[+~-]?\s*"?{}"?\s*="#,
            regex::escape(key)
        ))
    }

    pub fn compile(&self) -> Result<Matcher<'_>, String> {
        if self.pattern.is_empty() {
            return Err("pattern is empty".to_string());
        }
        if self.regex {
            Regex::new(&self.pattern)
                .map(Matcher::Regex)
                .map_err(|e| format!("invalid regex /{}/: {}", self.pattern, e))
        } else {
            Ok(Matcher::Literal(&self.pattern))
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.regex {
            write!(f, "/{}/", self.pattern)
        } else {
            write!(f, "{:?}", self.pattern)
        }
    }
}
