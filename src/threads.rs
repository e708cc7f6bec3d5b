//! Conversation threads stored as markdown notes.
//!
//! A thread lives at `<thread_dir>/<slug>.md`: a frontmatter header followed
//! by timestamped entries appended in order.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};

use crate::config::WritebackConfig;
use crate::frontmatter;

/// Characters of history fed into prompts.
pub const DEFAULT_HISTORY_CHARS: usize = 3000;

pub trait ThreadStore {
    /// Create the thread if missing; returns its path either way.
    fn create(&self, slug: &str, seed: Option<&str>) -> Result<PathBuf>;

    /// Append an entry. Fails if the thread does not exist.
    fn append(&self, slug: &str, role: &str, text: &str) -> Result<()>;

    /// The last `max_chars` characters of the thread body, or `""` if there is no thread.
    fn history(&self, slug: &str, max_chars: usize) -> Result<String>;

    fn path(&self, slug: &str) -> PathBuf;
}

/// `**YYYY-MM-DD HH:MM — role**`, a blank line, then the text.
#[must_use]
pub fn format_entry(role: &str, text: &str, at: DateTime<Utc>) -> String {
    format!("**{} — {role}**\n\n{text}\n", at.format("%Y-%m-%d %H:%M"))
}

fn thread_header(slug: &str) -> Mapping {
    let mut header = Mapping::new();
    header.insert("thread_id".into(), slug.into());
    header.insert("status".into(), "active".into());
    header.insert("context_links".into(), Value::Sequence(Vec::new()));
    header.insert("review_cadence".into(), "weekly".into());
    header
}

fn validate_slug(slug: &str) -> Result<()> {
    let valid = !slug.is_empty() && !slug.starts_with('.') && !slug.contains(['/', '\\']);
    anyhow::ensure!(valid, "invalid thread slug: {slug:?}");
    Ok(())
}

/// Thread notes under `writeback.thread_dir`. Writes must fall inside
/// `writeback.allow_globs`.
pub struct FileThreadStore {
    dir: PathBuf,
    writeback: WritebackConfig,
}

impl FileThreadStore {
    pub fn new(vault: &Path, writeback: &WritebackConfig) -> Self {
        Self {
            dir: vault.join(&writeback.thread_dir),
            writeback: writeback.clone(),
        }
    }

    fn ensure_writable(&self, slug: &str) -> Result<()> {
        let rel = format!(
            "{}/{slug}.md",
            self.writeback.thread_dir.trim_end_matches('/')
        );
        self.writeback.ensure_writable(&rel)
    }
}

impl ThreadStore for FileThreadStore {
    fn create(&self, slug: &str, seed: Option<&str>) -> Result<PathBuf> {
        validate_slug(slug)?;
        let path = self.path(slug);
        if path.exists() {
            return Ok(path);
        }
        self.ensure_writable(slug)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let body = seed
            .map(|s| format_entry("user", s, Utc::now()))
            .unwrap_or_default();
        frontmatter::write_note(&path, &thread_header(slug), &body)?;
        Ok(path)
    }

    fn append(&self, slug: &str, role: &str, text: &str) -> Result<()> {
        validate_slug(slug)?;
        self.ensure_writable(slug)?;
        let path = self.path(slug);
        anyhow::ensure!(path.exists(), "thread {slug} not found");

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        write!(file, "\n{}", format_entry(role, text, Utc::now()))
            .with_context(|| format!("failed to append to {}", path.display()))
    }

    fn history(&self, slug: &str, max_chars: usize) -> Result<String> {
        validate_slug(slug)?;
        let path = self.path(slug);
        if !path.exists() {
            return Ok(String::new());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let (_, body) = frontmatter::parse(&text);

        let len = body.chars().count();
        Ok(body.chars().skip(len.saturating_sub(max_chars)).collect())
    }

    fn path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.md"))
    }
}
