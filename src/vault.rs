//! The operations a vault exposes to the CLI: build, retrieve, note
//! mutations and frontmatter enrichment.
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde_yaml::Value;
use tracing::info;

use crate::config::{self, Config};
use crate::embedder::provider::{EmbeddingProvider, choose_backend};
use crate::embedder::{Embedder, ProviderKind};
use crate::error::VaultError;
use crate::frontmatter;
use crate::indexer::Indexer;
use crate::indexer::scanner::{NoteFile, scan_notes};
use crate::retriever::{RetrieveOptions, Retriever, SearchHit};
use crate::store::{self, Manifest};

pub use crate::config::init;

/// Notes that enrichment changed, or would change on a dry run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub changed: Vec<String>,
    pub applied: bool,
}

/// An initialized vault with its embedding backend.
pub struct Vault<E: Embedder = EmbeddingProvider> {
    root: PathBuf,
    config: Config,
    embedder: E,
}

impl Vault<EmbeddingProvider> {
    /// Load the vault config and select the embedding backend once.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        let embedder = EmbeddingProvider::select(&config)?;
        Ok(Self::with_embedder(root, config, embedder))
    }
}

impl<E: Embedder> Vault<E> {
    pub fn with_embedder(root: &Path, config: Config, embedder: E) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            embedder,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Rebuild the whole index.
    pub fn build(&self) -> Result<Manifest> {
        Indexer::new(&self.embedder, &self.config.rag).build(&self.root)
    }

    pub fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> Result<Vec<SearchHit>> {
        let index = store::load(&self.root)?;
        Retriever::new(&self.embedder, &index, self.config.rag.top_k).retrieve(query, opts)
    }

    /// Resolve a vault-relative note path, rejecting escapes and non-markdown files.
    pub fn note_path(&self, rel: &str) -> Result<PathBuf> {
        let path = Path::new(rel);
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || rel.is_empty() {
            return Err(VaultError::PathOutsideVault {
                path: rel.to_string(),
            }
            .into());
        }
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            return Err(VaultError::NotMarkdown {
                path: rel.to_string(),
            }
            .into());
        }
        Ok(self.root.join(path))
    }

    /// Write a new note and rebuild. Never overwrites.
    pub fn create_note(&self, rel: &str, content: &str) -> Result<Manifest> {
        let path = self.note_path(rel)?;
        anyhow::ensure!(!path.exists(), "note already exists: {rel}");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("failed to write {rel}"))?;
        info!("Created note {rel}");
        self.build()
    }

    pub fn move_note(&self, from: &str, to: &str) -> Result<Manifest> {
        let src = self.note_path(from)?;
        let dst = self.note_path(to)?;
        anyhow::ensure!(src.is_file(), "note not found: {from}");
        anyhow::ensure!(!dst.exists(), "note already exists: {to}");
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::rename(&src, &dst).with_context(|| format!("failed to move {from} to {to}"))?;
        info!("Moved note {from} -> {to}");
        self.build()
    }

    pub fn delete_note(&self, rel: &str) -> Result<Manifest> {
        let path = self.note_path(rel)?;
        anyhow::ensure!(path.is_file(), "note not found: {rel}");
        fs::remove_file(&path).with_context(|| format!("failed to delete {rel}"))?;
        info!("Deleted note {rel}");
        self.build()
    }

    /// Fill missing `title`, `created` and `tags` on every note.
    pub fn enrich_frontmatter(&self, apply: bool) -> Result<EnrichReport> {
        enrich_frontmatter(&self.root, &self.config, apply)
    }
}

/// Fill missing `title`, `created` and `tags` on every scanned note.
///
/// Existing keys are left alone. Nothing is written unless `apply` is set.
/// Needs no embedding backend.
pub fn enrich_frontmatter(root: &Path, config: &Config, apply: bool) -> Result<EnrichReport> {
    let notes = scan_notes(root, &config.rag.exclude_globs)?;
    let mut report = EnrichReport {
        changed: Vec::new(),
        applied: apply,
    };

    for note in &notes {
        let text = fs::read_to_string(&note.path)
            .with_context(|| format!("failed to read {}", note.rel))?;
        let (mut meta, body) = frontmatter::parse(&text);
        if !enrich_mapping(&mut meta, note)? {
            continue;
        }
        if apply {
            frontmatter::write_note(&note.path, &meta, &body)?;
        }
        report.changed.push(note.rel.clone());
    }

    info!(
        "{} {} notes",
        if apply { "Enriched" } else { "Would enrich" },
        report.changed.len()
    );
    Ok(report)
}

fn enrich_mapping(meta: &mut frontmatter::Frontmatter, note: &NoteFile) -> Result<bool> {
    let mut changed = false;

    if let Some(stem) = note.path.file_stem() {
        changed |= frontmatter::insert_missing(
            meta,
            "title",
            Value::String(stem.to_string_lossy().into_owned()),
        );
    }

    if !meta.contains_key("created") {
        let modified = fs::metadata(&note.path)
            .and_then(|m| m.modified())
            .with_context(|| format!("failed to stat {}", note.rel))?;
        let date = DateTime::<Local>::from(modified).format("%Y-%m-%d").to_string();
        changed |= frontmatter::insert_missing(meta, "created", Value::String(date));
    }

    let folder_tags: Vec<Value> = Path::new(&note.rel)
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|c| match c {
            Component::Normal(s) => Some(Value::String(s.to_string_lossy().to_lowercase())),
            _ => None,
        })
        .collect();
    if !folder_tags.is_empty() {
        changed |= frontmatter::insert_missing(meta, "tags", Value::Sequence(folder_tags));
    }

    Ok(changed)
}

/// Health summary for `doctor`.
#[derive(Debug)]
pub struct DoctorReport {
    pub config_path: PathBuf,
    pub config_error: Option<String>,
    pub manifest: Option<Manifest>,
    pub index_present: bool,
    pub backend: Result<ProviderKind, String>,
}

impl DoctorReport {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.config_error.is_none() && self.index_present && self.backend.is_ok()
    }
}

/// Inspect a vault without building or downloading anything.
pub fn doctor(root: &Path) -> DoctorReport {
    let config_path = config::config_path(root);
    let index_present = store::index_present(root);
    let manifest = store::read_manifest(root);

    match Config::load(root) {
        Ok(cfg) => DoctorReport {
            config_path,
            config_error: None,
            manifest,
            index_present,
            backend: choose_backend(
                cfg.rag.embedding_backend,
                cfg.api_key().is_some(),
                &cfg.provider.api_key_env,
            )
            .map_err(|e| e.to_string()),
        },
        Err(e) => DoctorReport {
            config_path,
            config_error: Some(format!("{e:#}")),
            manifest,
            index_present,
            backend: Err("config unavailable".to_string()),
        },
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.config_error {
            None => writeln!(f, "Config: {}", self.config_path.display())?,
            Some(e) => writeln!(f, "Config: error ({e})")?,
        }
        match (&self.manifest, self.index_present) {
            (Some(m), true) => writeln!(
                f,
                "Index: present ({} chunks, {} via {}, {} dims)",
                m.total_chunks, m.model, m.provider, m.dimensions
            )?,
            (None, true) => writeln!(f, "Index: present (manifest missing)")?,
            (_, false) => writeln!(f, "Index: missing (run `vaultrag index`)")?,
        }
        match &self.backend {
            Ok(kind) => writeln!(f, "Embedding backend: {kind}")?,
            Err(e) => writeln!(f, "Embedding backend: unavailable ({e})")?,
        }
        write!(
            f,
            "{}",
            if self.ok() {
                "Doctor complete."
            } else {
                "Doctor found issues."
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::hash::HashEmbedder;
    use tempfile::tempdir;

    fn open(dir: &Path) -> Vault<HashEmbedder> {
        init(dir).unwrap();
        let cfg = Config::load(dir).unwrap();
        Vault::with_embedder(dir, cfg, HashEmbedder::new(64))
    }

    fn downcast(err: &anyhow::Error) -> Option<&VaultError> {
        err.downcast_ref::<VaultError>()
    }

    #[test]
    fn test_note_path_rules() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());

        assert!(vault.note_path("projects/a.md").is_ok());
        let err = vault.note_path("../x.md").unwrap_err();
        assert!(matches!(downcast(&err), Some(VaultError::PathOutsideVault { .. })));
        let err = vault.note_path("/etc/x.md").unwrap_err();
        assert!(matches!(downcast(&err), Some(VaultError::PathOutsideVault { .. })));
        let err = vault.note_path("notes/a.txt").unwrap_err();
        assert!(matches!(downcast(&err), Some(VaultError::NotMarkdown { .. })));
    }

    #[test]
    fn test_note_lifecycle_rebuilds() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());

        let m = vault.create_note("projects/a.md", "# A\nalpha text\n").unwrap();
        assert_eq!(m.total_chunks, 1);
        assert!(vault.create_note("projects/a.md", "again").is_err());

        vault.move_note("projects/a.md", "archive/a.md").unwrap();
        let hits = vault.retrieve("alpha", &RetrieveOptions::default()).unwrap();
        assert_eq!(hits[0].chunk.file, "archive/a.md");

        let m = vault.delete_note("archive/a.md").unwrap();
        assert_eq!(m.total_chunks, 0);
        assert!(vault.delete_note("archive/a.md").is_err());
    }

    #[test]
    fn test_enrich_dry_run_then_apply() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        let nested = dir.path().join("Projects/Alpha/note_one.md");
        fs::create_dir_all(nested.parent().unwrap()).unwrap();
        fs::write(&nested, "Some body text").unwrap();

        let dry = vault.enrich_frontmatter(false).unwrap();
        assert_eq!(dry.changed, vec!["Projects/Alpha/note_one.md"]);
        assert_eq!(fs::read_to_string(&nested).unwrap(), "Some body text");

        let applied = vault.enrich_frontmatter(true).unwrap();
        assert_eq!(applied.changed.len(), 1);
        let text = fs::read_to_string(&nested).unwrap();
        let (meta, body) = frontmatter::parse(&text);
        assert_eq!(frontmatter::get_str(&meta, "title"), Some("note_one"));
        assert!(frontmatter::get_str(&meta, "created").is_some());
        assert_eq!(crate::tags::normalize_tags(&meta), vec!["projects", "alpha"]);
        assert_eq!(body, "Some body text");

        assert!(vault.enrich_frontmatter(false).unwrap().changed.is_empty());
    }

    #[test]
    fn test_enrich_preserves_existing_keys() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        let note = dir.path().join("x.md");
        fs::write(&note, "---\ntitle: Custom\ncustom_key: 123\n---\n\nBody").unwrap();

        vault.enrich_frontmatter(true).unwrap();
        let text = fs::read_to_string(&note).unwrap();
        assert!(text.contains("title: Custom"));
        assert!(text.contains("custom_key: 123"));
        assert!(text.contains("created:"));
        assert!(!text.contains("tags:"), "top-level notes get no folder tags");
        assert!(text.ends_with("---\n\nBody"));
    }

    #[test]
    fn test_enrich_needs_no_embedding_backend() {
        let dir = tempdir().unwrap();
        init(dir.path()).unwrap();
        let mut cfg = Config::load(dir.path()).unwrap();
        cfg.rag.embedding_backend = crate::config::EmbeddingBackend::Openai;
        cfg.provider.api_key_env = "VAULTRAG_TEST_UNSET_KEY".into();
        fs::write(dir.path().join("n.md"), "body").unwrap();

        let report = enrich_frontmatter(dir.path(), &cfg, true).unwrap();
        assert_eq!(report.changed, vec!["n.md"]);
        assert!(fs::read_to_string(dir.path().join("n.md")).unwrap().contains("title: n"));
    }

    #[test]
    fn test_retrieve_before_build() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        let err = vault.retrieve("q", &RetrieveOptions::default()).unwrap_err();
        assert!(matches!(downcast(&err), Some(VaultError::IndexNotFound { .. })));
    }

    #[test]
    fn test_doctor() {
        let dir = tempdir().unwrap();
        let report = doctor(dir.path());
        assert!(report.config_error.is_some());
        assert!(!report.ok());

        let vault = open(dir.path());
        vault.build().unwrap();
        let report = doctor(dir.path());
        assert!(report.config_error.is_none());
        assert!(report.index_present);
        assert_eq!(report.manifest.as_ref().unwrap().model, "hash");
        assert!(report.to_string().contains("Index: present (0 chunks"));
    }
}
