//! Per-scenario working directory and invocation context
//!
//! Every invocation receives its workspace explicitly; nothing about the
//! working directory, variables or environment lives in process-wide state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::vars::{var_args, VarValue};
use crate::common::{paths, Error, Result};

/// Entries never copied into an isolated workspace
const SKIPPED_ENTRIES: &[&str] = &[".terraform", ".git"];

/// Working directory plus everything the tool needs to run in it
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    scratch: Option<TempDir>,
    vars: BTreeMap<String, VarValue>,
    var_files: Vec<PathBuf>,
    backend_config: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
    initialized: bool,
}

impl Workspace {
    /// Copy `source` into a fresh temporary directory owned by this workspace
    pub fn isolated(scenario: &str, source: &Path) -> Result<Self> {
        if !source.is_dir() {
            return Err(Error::invalid_scenario(
                scenario,
                format!("configuration directory '{}' does not exist", source.display()),
            ));
        }
        let scratch = tempfile::Builder::new()
            .prefix(&paths::scratch_prefix(scenario))
            .tempdir()?;
        copy_module(source, scratch.path())?;
        tracing::debug!(
            scenario,
            source = %source.display(),
            workdir = %scratch.path().display(),
            "Prepared isolated workspace"
        );
        Ok(Self::with_root(scratch.path().to_path_buf(), Some(scratch)))
    }

    /// Run directly in `dir`; the caller is responsible for not sharing it
    pub fn in_place(scenario: &str, dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::invalid_scenario(
                scenario,
                format!("configuration directory '{}' does not exist", dir.display()),
            ));
        }
        Ok(Self::with_root(dir.to_path_buf(), None))
    }

    fn with_root(root: PathBuf, scratch: Option<TempDir>) -> Self {
        Self {
            root,
            scratch,
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            backend_config: BTreeMap::new(),
            env: BTreeMap::new(),
            initialized: false,
        }
    }

    pub fn with_vars(mut self, vars: BTreeMap<String, VarValue>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_var_files(mut self, var_files: Vec<PathBuf>) -> Self {
        self.var_files = var_files;
        self
    }

    pub fn with_backend_config(mut self, backend_config: BTreeMap<String, String>) -> Self {
        self.backend_config = backend_config;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Directory the tool runs in and FileExists rules resolve against
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn is_isolated(&self) -> bool {
        self.scratch.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// `-var` and `-var-file` arguments
    pub fn variable_args(&self) -> Vec<String> {
        let mut args = var_args(&self.vars);
        args.extend(
            self.var_files
                .iter()
                .map(|f| format!("-var-file={}", f.display())),
        );
        args
    }

    /// `-backend-config` arguments for init
    pub fn backend_args(&self) -> Vec<String> {
        self.backend_config
            .iter()
            .map(|(k, v)| format!("-backend-config={}={}", k, v))
            .collect()
    }

    /// Environment for every invocation
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("TF_IN_AUTOMATION".to_string(), "1".to_string()),
            ("TF_INPUT".to_string(), "0".to_string()),
        ];
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Remove the isolated directory, if any
    pub fn close(self) -> Result<()> {
        match self.scratch {
            Some(dir) => {
                let path = dir.path().display().to_string();
                dir.close()
                    .map_err(|e| Error::Teardown(format!("failed to remove '{}': {}", path, e)))
            }
            None => Ok(()),
        }
    }
}

/// Recursively copy a module directory, skipping tool caches and local state
///
/// Symlinks are followed and their targets copied, so relative links to
/// shared modules still resolve from the scratch directory.
fn copy_module(from: &Path, to: &Path) -> Result<()> {
    let mut ancestors = Vec::new();
    copy_tree(from, to, &mut ancestors)
}

fn copy_tree(from: &Path, to: &Path, ancestors: &mut Vec<PathBuf>) -> Result<()> {
    ancestors.push(from.canonicalize()?);
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if SKIPPED_ENTRIES.contains(&name_str.as_ref()) || is_local_state(&name_str) {
            continue;
        }

        let source = entry.path();
        let target = to.join(&name);
        // Follows symlinks
        let metadata = match std::fs::metadata(&source) {
            Ok(metadata) => metadata,
            Err(e) if entry.file_type()?.is_symlink() => {
                tracing::warn!(link = %source.display(), "Skipping dangling symlink: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            if ancestors.contains(&source.canonicalize()?) {
                tracing::warn!(link = %source.display(), "Skipping symlink cycle");
                continue;
            }
            std::fs::create_dir_all(&target)?;
            copy_tree(&source, &target, ancestors)?;
        } else {
            std::fs::copy(&source, &target)?;
        }
    }
    ancestors.pop();
    Ok(())
}

fn is_local_state(name: &str) -> bool {
    name.starts_with("terraform.tfstate")
}
