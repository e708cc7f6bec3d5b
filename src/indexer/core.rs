use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::embedder::Embedder;
use crate::frontmatter;
use crate::indexer::chunker::chunk_document;
use crate::indexer::scanner::{NoteFile, scan_notes};
use crate::store::{self, ChunkRecord, Manifest};
use crate::tags::normalize_tags;

/// `"{file_name}-{ordinal}-{first 10 hex of sha256(text)}"`.
#[must_use]
pub fn chunk_id(file_name: &str, ordinal: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("{file_name}-{ordinal}-{}", &hex[..10])
}

/// Chunk records and their texts, in vector order.
#[derive(Debug, Default)]
pub struct CollectedChunks {
    pub records: Vec<ChunkRecord>,
    pub texts: Vec<String>,
}

/// Rebuilds a vault's artifact set with one embedder for every chunk.
pub struct Indexer<'a, E: Embedder + ?Sized> {
    pub embedder: &'a E,
    pub chunk_chars: usize,
    pub chunk_overlap: usize,
    pub exclude_globs: Vec<String>,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(embedder: &'a E, rag: &RagConfig) -> Self {
        Self {
            embedder,
            chunk_chars: rag.chunk_chars,
            chunk_overlap: rag.chunk_overlap,
            exclude_globs: rag.exclude_globs.clone(),
        }
    }

    /// Scan, parse and chunk every note without embedding anything.
    pub fn collect(&self, vault: &Path) -> Result<CollectedChunks> {
        let notes = scan_notes(vault, &self.exclude_globs)?;
        let mut out = CollectedChunks::default();
        for note in &notes {
            self.collect_note(note, &mut out);
        }
        info!(
            "Scanned {} notes into {} chunks",
            notes.len(),
            out.records.len()
        );
        Ok(out)
    }

    fn collect_note(&self, note: &NoteFile, out: &mut CollectedChunks) {
        let raw = match fs::read(&note.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("skipping unreadable note {}: {e}", note.rel);
                return;
            }
        };
        let text = String::from_utf8_lossy(&raw);
        let (meta, body) = frontmatter::parse(&text);
        let tags = normalize_tags(&meta);

        let file_name = note
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for (i, chunk) in chunk_document(&body, self.chunk_chars, self.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            out.records.push(ChunkRecord {
                file: note.rel.clone(),
                chunk_id: chunk_id(&file_name, i, &chunk.text),
                start: chunk.start,
                end: chunk.end,
                heading: chunk.heading,
                tags: tags.clone(),
            });
            out.texts.push(chunk.text);
        }
    }

    /// Full rebuild: every chunk is embedded in one batch and the whole
    /// artifact set is replaced.
    pub fn build(&self, vault: &Path) -> Result<Manifest> {
        let started = Instant::now();
        let collected = self.collect(vault)?;

        let texts: Vec<&str> = collected.texts.iter().map(String::as_str).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder
                .embed_batch(&texts)
                .context("failed to embed chunks")?
        };
        anyhow::ensure!(
            vectors.len() == texts.len(),
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            texts.len()
        );

        // Empty builds still need a width for the vector table.
        let dimensions = vectors
            .first()
            .map_or_else(|| self.embedder.dimensions(), Vec::len);

        let manifest = Manifest::for_build(self.embedder, dimensions, collected.records.len());
        store::write_artifacts(vault, &vectors, &collected.records, &manifest)?;

        info!(
            "Indexed {} chunks with {} ({}) in {:.2?}",
            manifest.total_chunks,
            manifest.model,
            manifest.provider,
            started.elapsed()
        );
        Ok(manifest)
    }

    /// Currently a full rebuild; no differential work is done.
    pub fn update_incremental(&self, vault: &Path) -> Result<Manifest> {
        self.build(vault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::hash::HashEmbedder;
    use crate::embedder::{EmbedderError, ProviderKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Counts batch calls so tests can check chunks are embedded together.
    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts)
        }
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn rag(chunk_chars: usize, chunk_overlap: usize) -> RagConfig {
        RagConfig {
            chunk_chars,
            chunk_overlap,
            ..RagConfig::default()
        }
    }

    #[test]
    fn test_chunk_id_format() {
        let id = chunk_id("alpha.md", 2, "hello");
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(id, "alpha.md-2-2cf24dba5f");
    }

    #[test]
    fn test_collect_strips_frontmatter_and_tags_chunks() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(
            dir.path().join("notes/a.md"),
            "---\ntags: [\"#ProjectX\", research]\n---\n# Alpha\nbody text\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("_ai")).unwrap();
        fs::write(dir.path().join("_ai/skip.md"), "excluded").unwrap();

        let embedder = HashEmbedder::new(32);
        let indexer = Indexer::new(&embedder, &rag(1200, 200));
        let collected = indexer.collect(dir.path()).unwrap();

        assert_eq!(collected.records.len(), 1);
        let rec = &collected.records[0];
        assert_eq!(rec.file, "notes/a.md");
        assert_eq!(rec.tags, vec!["projectx", "research"]);
        assert_eq!(rec.heading, "# Alpha");
        assert_eq!(rec.start, 0);
        assert_eq!(rec.end, "# Alpha\nbody text\n".chars().count());
        assert!(rec.chunk_id.starts_with("a.md-0-"));
        assert_eq!(collected.texts[0], "# Alpha\nbody text\n");
    }

    #[test]
    fn test_build_embeds_in_one_batch() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "x".repeat(2500)).unwrap();
        fs::write(dir.path().join("b.md"), "y".repeat(500)).unwrap();

        let embedder = CountingEmbedder {
            inner: HashEmbedder::new(16),
            calls: AtomicUsize::new(0),
        };
        let manifest = Indexer::new(&embedder, &rag(1200, 200))
            .build(dir.path())
            .unwrap();

        assert_eq!(manifest.total_chunks, 4);
        assert_eq!(manifest.model, "counting");
        assert_eq!(manifest.provider, ProviderKind::Local);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        let loaded = store::load(dir.path()).unwrap();
        assert_eq!(loaded.chunks.len(), loaded.vectors.len().unwrap());
        let spans: Vec<(usize, usize)> = loaded
            .chunks
            .iter()
            .filter(|c| c.file == "a.md")
            .map(|c| (c.start, c.end))
            .collect();
        assert_eq!(spans, vec![(0, 1200), (1000, 2200), (2000, 2500)]);
    }

    #[test]
    fn test_empty_vault_uses_provider_dimensions() {
        let dir = tempdir().unwrap();
        let embedder = CountingEmbedder {
            inner: HashEmbedder::new(24),
            calls: AtomicUsize::new(0),
        };
        let manifest = Indexer::new(&embedder, &rag(1200, 200))
            .build(dir.path())
            .unwrap();

        assert_eq!(manifest.total_chunks, 0);
        assert_eq!(manifest.dimensions, 24);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

        let loaded = store::load(dir.path()).unwrap();
        assert_eq!(loaded.vectors.dimensions(), 24);
        assert!(loaded.chunks.is_empty());
    }

    #[test]
    fn test_malformed_frontmatter_does_not_abort() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.md"), "---\n: : [\n---\nstill indexed\n").unwrap();
        fs::write(dir.path().join("open.md"), "---\nnever closed\n").unwrap();

        let embedder = HashEmbedder::new(16);
        let manifest = Indexer::new(&embedder, &rag(1200, 200))
            .update_incremental(dir.path())
            .unwrap();
        assert_eq!(manifest.total_chunks, 2);
    }
}
