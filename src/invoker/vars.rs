//! Input variable values and their rendering as `-var` arguments

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value bound to a named input variable
///
/// Scalars, lists and nested maps, as they appear in scenario YAML. A
/// top-level null (`key: ~`) passes no `-var` at all, so the variable keeps
/// its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<VarValue>),
    Map(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// Render as the right-hand side of `-var key=value`
    ///
    /// Top-level strings are passed raw; everything else is an HCL literal.
    pub fn to_arg(&self) -> String {
        match self {
            VarValue::String(s) => s.clone(),
            other => other.to_hcl(),
        }
    }

    /// Render as an HCL expression
    pub fn to_hcl(&self) -> String {
        match self {
            VarValue::Null => "null".to_string(),
            VarValue::Bool(b) => b.to_string(),
            VarValue::Integer(i) => i.to_string(),
            VarValue::Float(f) => f.to_string(),
            VarValue::String(s) => quote(s),
            VarValue::List(items) => {
                let inner: Vec<String> = items.iter().map(VarValue::to_hcl).collect();
                format!("[{}]", inner.join(", "))
            }
            VarValue::Map(entries) => {
                if entries.is_empty() {
                    return "{}".to_string();
                }
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{} = {}", quote(k), v.to_hcl()))
                    .collect();
                format!("{{ {} }}", inner.join(", "))
            }
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<Vec<&str>> for VarValue {
    fn from(items: Vec<&str>) -> Self {
        VarValue::List(items.into_iter().map(VarValue::from).collect())
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    // "${" and "%{" open template sequences
    out.replace("${", "$${").replace("%{", "%%{")
}

/// Render a variable map as `-var` arguments, in key order
///
/// Null values are skipped.
pub fn var_args(vars: &BTreeMap<String, VarValue>) -> Vec<String> {
    vars.iter()
        .filter(|(_, v)| **v != VarValue::Null)
        .flat_map(|(k, v)| ["-var".to_string(), format!("{}={}", k, v.to_arg())])
        .collect()
}
