//! Assistant flows built on retrieval: ask, chat, plan and capture.
//!
//! Prompts are redacted before they reach the generator. Generated tokens go
//! to the caller's sink as they arrive; if the stream fails, what was already
//! written stays written and nothing is persisted.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::citations::format_citations;
use crate::config::WritebackConfig;
use crate::embedder::Embedder;
use crate::generation::TextGenerator;
use crate::gitwrap::Committer;
use crate::redact::Redactor;
use crate::retriever::{RetrieveOptions, SearchHit};
use crate::threads::{DEFAULT_HISTORY_CHARS, ThreadStore};
use crate::vault::Vault;

pub const CAPTURE_HEADING: &str = "⚡ Captures";

#[derive(Debug)]
pub struct Answer {
    pub hits: Vec<SearchHit>,
    pub citations: String,
}

#[derive(Debug)]
pub struct Reply {
    pub text: String,
    pub citations: String,
    pub committed: bool,
}

#[must_use]
pub fn chat_prompt(history: &str, message: &str, citations: &str) -> String {
    format!(
        "You are a planning assistant. Use the provided context to answer.\n\
         Thread history (truncated):\n{history}\n\n\
         User message: {message}\n\nSources:\n{citations}\n"
    )
}

#[must_use]
pub fn plan_prompt(history: &str) -> String {
    format!(
        "Summarize recent progress and produce a weekly checkpoint with: wins, blockers, next 3 tasks.\n\
         History:\n{history}\n"
    )
}

/// One-off question: retrieve and cite.
pub fn ask<E: Embedder>(
    vault: &Vault<E>,
    question: &str,
    opts: &RetrieveOptions,
) -> Result<Answer> {
    let hits = vault.retrieve(question, opts)?;
    let citations = format_citations(&hits);
    Ok(Answer { hits, citations })
}

/// Append `- HH:MM text` under the captures heading of today's note in
/// `writeback.default_target`.
pub fn capture(
    vault_root: &Path,
    writeback: &WritebackConfig,
    text: &str,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    let target = writeback.default_target.trim_end_matches('/');
    let file_name = format!("{}.md", at.format("%Y-%m-%d"));
    writeback.ensure_writable(&format!("{target}/{file_name}"))?;

    let day_dir = vault_root.join(target);
    fs::create_dir_all(&day_dir)
        .with_context(|| format!("failed to create {}", day_dir.display()))?;
    let path = day_dir.join(file_name);

    let mut content = if path.exists() {
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?
    } else {
        String::new()
    };
    if !content.contains(CAPTURE_HEADING) {
        content.push_str(&format!("\n## {CAPTURE_HEADING}\n"));
    }
    content.push_str(&format!("- {} {text}\n", at.format("%H:%M")));

    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// The flows that talk to a generator.
pub struct Assistant<'a, E: Embedder> {
    pub vault: &'a Vault<E>,
    pub generator: &'a dyn TextGenerator,
    pub threads: &'a dyn ThreadStore,
    pub committer: &'a dyn Committer,
    pub redactor: Redactor,
}

impl<'a, E: Embedder> Assistant<'a, E> {
    pub fn new(
        vault: &'a Vault<E>,
        generator: &'a dyn TextGenerator,
        threads: &'a dyn ThreadStore,
        committer: &'a dyn Committer,
    ) -> Result<Self> {
        let redactor = Redactor::from_patterns(&vault.config().privacy.redact)?;
        Ok(Self {
            vault,
            generator,
            threads,
            committer,
            redactor,
        })
    }

    /// Stream a completion into `sink`, returning the full text.
    fn generate(&self, prompt: &str, sink: &mut dyn Write) -> Result<String> {
        let prompt = self.redactor.redact(prompt);
        let mut text = String::new();
        for token in self.generator.stream(&prompt)? {
            let token = token?;
            sink.write_all(token.as_bytes())?;
            sink.flush()?;
            text.push_str(&token);
        }
        writeln!(sink)?;
        Ok(text)
    }

    /// Answer a message inside a thread. With `write`, both turns are
    /// appended to the thread and committed.
    pub fn chat(
        &self,
        slug: &str,
        message: &str,
        opts: &RetrieveOptions,
        write: bool,
        sink: &mut dyn Write,
    ) -> Result<Reply> {
        let history = self.threads.history(slug, DEFAULT_HISTORY_CHARS)?;
        let hits = self.vault.retrieve(message, opts)?;
        let citations = format_citations(&hits);

        let text = self.generate(&chat_prompt(&history, message, &citations), sink)?;

        let mut committed = false;
        if write {
            self.threads.create(slug, None)?;
            self.threads.append(slug, "user", message)?;
            self.threads.append(slug, "assistant", &text)?;
            committed = self.committer.commit(
                &[self.threads.path(slug)],
                "chat",
                slug,
                hits.len(),
            )?;
        }

        Ok(Reply {
            text,
            citations,
            committed,
        })
    }

    /// Weekly checkpoint over a thread's history.
    pub fn plan(&self, slug: &str, write: bool, sink: &mut dyn Write) -> Result<Reply> {
        let history = self.threads.history(slug, DEFAULT_HISTORY_CHARS)?;
        let text = self.generate(&plan_prompt(&history), sink)?;

        let mut committed = false;
        if write {
            self.threads.create(slug, None)?;
            self.threads.append(slug, "assistant", &text)?;
            committed = self
                .committer
                .commit(&[self.threads.path(slug)], "plan", slug, 0)?;
        }

        Ok(Reply {
            text,
            citations: String::new(),
            committed,
        })
    }
}
