//! Top-k retrieval with optional tag and path filters.
//!
//! Filters are applied after the similarity search, so a filtered query
//! over-fetches candidates first. Filtering only removes hits; the surviving
//! hits keep their similarity order and are re-ranked from 1.
use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use tracing::debug;

use crate::embedder::Embedder;
use crate::error::VaultError;
use crate::store::{ChunkRecord, LoadedIndex, Manifest, Neighbor};
use crate::tags::normalize_tag;

#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Results wanted; falls back to `rag.top_k`.
    pub k: Option<usize>,
    pub tag: Option<String>,
    /// Glob over the vault-relative file path; `*` may cross `/`.
    pub path_glob: Option<String>,
    /// Candidates fetched before filtering; defaults to `3 * k`.
    pub oversample: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub score: f32,
    #[serde(flatten)]
    pub chunk: ChunkRecord,
}

/// Filters resolved from [`RetrieveOptions`]. Empty strings mean no filter.
pub struct Filters {
    tag: Option<String>,
    path: Option<GlobMatcher>,
}

impl Filters {
    pub fn from_options(opts: &RetrieveOptions) -> Result<Self> {
        let tag = opts.tag.as_deref().and_then(normalize_tag);
        let path = match opts.path_glob.as_deref().filter(|g| !g.is_empty()) {
            Some(pattern) => Some(
                Glob::new(pattern)
                    .with_context(|| format!("invalid path glob: {pattern}"))?
                    .compile_matcher(),
            ),
            None => None,
        };
        Ok(Self { tag, path })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tag.is_some() || self.path.is_some()
    }

    fn accepts(&self, chunk: &ChunkRecord) -> bool {
        let tag_ok = self
            .tag
            .as_ref()
            .is_none_or(|tag| chunk.tags.iter().any(|t| t == tag));
        let path_ok = self
            .path
            .as_ref()
            .is_none_or(|path| path.is_match(&chunk.file));
        tag_ok && path_ok
    }
}

/// How many neighbours to request from the vector index.
#[must_use]
pub fn candidate_count(k: usize, oversample: Option<usize>, filtered: bool) -> usize {
    if filtered {
        oversample.unwrap_or(k.saturating_mul(3))
    } else {
        k
    }
}

/// Map neighbours to chunks, drop what the filters reject, rank the rest
/// `1..` in arrival order and keep the first `k`.
///
/// Neighbours whose ordinal has no chunk-log entry are dropped.
pub fn filter_and_rerank(
    neighbors: &[Neighbor],
    chunks: &[ChunkRecord],
    filters: &Filters,
    k: usize,
) -> Vec<SearchHit> {
    neighbors
        .iter()
        .filter_map(|n| chunks.get(n.ordinal).map(|c| (n.score, c)))
        .filter(|(_, chunk)| filters.accepts(chunk))
        .take(k)
        .enumerate()
        .map(|(i, (score, chunk))| SearchHit {
            rank: i + 1,
            score,
            chunk: chunk.clone(),
        })
        .collect()
}

/// Refuse to query an index built by another backend or model, even when
/// the widths agree.
pub fn check_backend<E: Embedder + ?Sized>(manifest: &Manifest, embedder: &E) -> Result<()> {
    if manifest.provider == embedder.kind() && manifest.model == embedder.model_name() {
        return Ok(());
    }
    Err(VaultError::BackendMismatch {
        built: format!("{} ({})", manifest.model, manifest.provider),
        active: format!("{} ({})", embedder.model_name(), embedder.kind()),
    }
    .into())
}

pub struct Retriever<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    index: &'a LoadedIndex,
    default_k: usize,
}

impl<'a, E: Embedder + ?Sized> Retriever<'a, E> {
    pub fn new(embedder: &'a E, index: &'a LoadedIndex, default_k: usize) -> Self {
        Self {
            embedder,
            index,
            default_k,
        }
    }

    pub fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> Result<Vec<SearchHit>> {
        let k = opts.k.unwrap_or(self.default_k);
        let filters = Filters::from_options(opts)?;
        if let Some(manifest) = &self.index.manifest {
            check_backend(manifest, self.embedder)?;
        }

        let query_vec = self
            .embedder
            .embed(query)
            .context("failed to embed query")?;
        let index_dims = self.index.vectors.dimensions();
        anyhow::ensure!(
            query_vec.len() == index_dims,
            "query embedding has {} dimensions but the index was built with {}; rebuild the index",
            query_vec.len(),
            index_dims
        );

        let wanted = candidate_count(k, opts.oversample, filters.is_active());
        let neighbors = self
            .index
            .vectors
            .search(&query_vec, wanted)
            .context("vector search failed")?;

        let hits = filter_and_rerank(&neighbors, &self.index.chunks, &filters, k);
        debug!(
            "retrieve: {} candidates, {} kept (k={k})",
            neighbors.len(),
            hits.len()
        );
        Ok(hits)
    }
}
