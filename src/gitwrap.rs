//! Auto-commit of files the assistant writes.
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::GitConfig;

pub trait Committer {
    /// Commit `paths`. Returns `false` when nothing was committed.
    fn commit(&self, paths: &[PathBuf], command: &str, target: &str, k: usize) -> Result<bool>;
}

/// Fill `{command}`, `{target}` and `{k}` in a message template.
#[must_use]
pub fn render_message(template: &str, command: &str, target: &str, k: usize) -> String {
    template
        .replace("{command}", command)
        .replace("{target}", target)
        .replace("{k}", &k.to_string())
}

/// Commits through the `git` executable. A no-op when auto-commit is off or
/// the vault is not inside a work tree.
pub struct GitCommitter {
    vault: PathBuf,
    enabled: bool,
    template: String,
}

impl GitCommitter {
    pub fn new(vault: &Path, git: &GitConfig) -> Self {
        Self {
            vault: vault.to_path_buf(),
            enabled: git.auto_commit,
            template: git.message_template.clone(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.vault)
            .output()
            .context("failed to run git")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            anyhow::bail!("git {} failed: {}", args.first().unwrap_or(&""), stderr);
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn is_work_tree(&self) -> bool {
        match self.git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) => out.trim() == "true",
            Err(e) => {
                debug!("not committing: {e}");
                false
            }
        }
    }
}

impl Committer for GitCommitter {
    fn commit(&self, paths: &[PathBuf], command: &str, target: &str, k: usize) -> Result<bool> {
        if !self.enabled || !self.is_work_tree() {
            return Ok(false);
        }

        let rels: Vec<String> = paths
            .iter()
            .filter_map(|p| p.strip_prefix(&self.vault).ok())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if rels.is_empty() {
            return Ok(false);
        }

        let message = render_message(&self.template, command, target, k);

        let mut add = vec!["add", "--"];
        add.extend(rels.iter().map(String::as_str));
        self.git(&add)?;

        let mut commit = vec!["commit", "-m", message.as_str(), "--"];
        commit.extend(rels.iter().map(String::as_str));
        self.git(&commit)?;

        info!("Committed {} file(s): {message}", rels.len());
        Ok(true)
    }
}
