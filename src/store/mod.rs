//! Vector Index Store: the on-disk artifact set of one vault.
//!
//! `<vault>/_ai/index/` holds `vectors.sqlite`, `chunks.jsonl` and
//! `manifest.json`. A rebuild writes a complete set into a staging directory
//! and swaps it in with renames. Between the two renames the previous set sits
//! in `_ai/index.old`, and `load` reads it from there.
pub mod models;
pub mod vector;

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub use models::{ChunkRecord, Manifest};
pub use vector::{Neighbor, VectorIndex};

use crate::error::VaultError;

pub const INDEX_DIR: &str = "_ai/index";
const STAGING_DIR: &str = "_ai/index.staging";
const RETIRED_DIR: &str = "_ai/index.old";

pub const VECTORS_FILE: &str = "vectors.sqlite";
pub const CHUNKS_FILE: &str = "chunks.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";

#[must_use]
pub fn index_dir(vault: &Path) -> PathBuf {
    vault.join(INDEX_DIR)
}

/// A loaded artifact set. `chunks[i]` describes the vector with ordinal `i`.
pub struct LoadedIndex {
    pub vectors: VectorIndex,
    pub chunks: Vec<ChunkRecord>,
    /// `None` when the manifest is missing or unreadable.
    pub manifest: Option<Manifest>,
}

/// Persist a complete artifact set, replacing the previous one.
///
/// Order inside the staging directory: vectors, chunk log, manifest last.
pub fn write_artifacts(
    vault: &Path,
    vectors: &[Vec<f32>],
    chunks: &[ChunkRecord],
    manifest: &Manifest,
) -> Result<()> {
    anyhow::ensure!(
        vectors.len() == chunks.len(),
        "vector count {} does not match chunk count {}",
        vectors.len(),
        chunks.len()
    );

    let staging = vault.join(STAGING_DIR);
    if staging.exists() {
        fs::remove_dir_all(&staging)
            .with_context(|| format!("failed to clear {}", staging.display()))?;
    }
    fs::create_dir_all(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;

    {
        let mut index = VectorIndex::create(staging.join(VECTORS_FILE), manifest.dimensions)
            .context("failed to create vector index")?;
        index
            .insert_all(vectors)
            .context("failed to write vectors")?;
    }

    write_chunk_log(&staging.join(CHUNKS_FILE), chunks)?;

    let manifest_json =
        serde_json::to_string_pretty(manifest).context("failed to serialize manifest")?;
    fs::write(staging.join(MANIFEST_FILE), manifest_json).context("failed to write manifest")?;

    swap_into_place(vault, &staging)?;
    info!(
        "Wrote {} chunks to {}",
        chunks.len(),
        index_dir(vault).display()
    );
    Ok(())
}

fn write_chunk_log(path: &Path, chunks: &[ChunkRecord]) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for chunk in chunks {
        serde_json::to_writer(&mut writer, chunk).context("failed to serialize chunk")?;
        writer.write_all(b"\n")?;
    }
    writer.flush().context("failed to write chunk log")
}

fn swap_into_place(vault: &Path, staging: &Path) -> Result<()> {
    let live = index_dir(vault);
    let retired = vault.join(RETIRED_DIR);

    // With no live set, the retired one is the last complete build; keep it
    // until the new set is in place.
    if retired.exists() && live.exists() {
        fs::remove_dir_all(&retired)
            .with_context(|| format!("failed to clear {}", retired.display()))?;
    }
    if live.exists() {
        fs::rename(&live, &retired)
            .with_context(|| format!("failed to retire {}", live.display()))?;
    }
    fs::rename(staging, &live)
        .with_context(|| format!("failed to move new index into {}", live.display()))?;
    if retired.exists() {
        fs::remove_dir_all(&retired)
            .with_context(|| format!("failed to remove {}", retired.display()))?;
    }
    Ok(())
}

/// The directory holding the current artifact set: the live one, or the
/// retired one while a swap is in progress (or was interrupted).
fn current_dir(vault: &Path) -> PathBuf {
    let live = index_dir(vault);
    if live.join(VECTORS_FILE).exists() {
        return live;
    }
    let retired = vault.join(RETIRED_DIR);
    if retired.join(VECTORS_FILE).exists() {
        warn!("no live index; reading the previous set from {}", retired.display());
        return retired;
    }
    live
}

/// Whether a complete vector index exists, live or mid-swap.
#[must_use]
pub fn index_present(vault: &Path) -> bool {
    current_dir(vault).join(VECTORS_FILE).exists()
}

/// Load the artifact set, trusting the ordinal correspondence.
///
/// Fails with [`VaultError::IndexNotFound`] if no vector index was ever built.
pub fn load(vault: &Path) -> Result<LoadedIndex> {
    let dir = current_dir(vault);
    let vectors_path = dir.join(VECTORS_FILE);
    if !vectors_path.exists() {
        return Err(VaultError::IndexNotFound {
            path: index_dir(vault).join(VECTORS_FILE),
        }
        .into());
    }

    let vectors = VectorIndex::open(&vectors_path)
        .with_context(|| format!("failed to open {}", vectors_path.display()))?;
    let chunks = read_chunk_log(&dir.join(CHUNKS_FILE))?;
    let manifest = read_manifest_in(&dir);

    let size = vectors.len().context("failed to count vectors")?;
    if size != chunks.len() {
        warn!(
            "vector index has {size} entries but chunk log has {}",
            chunks.len()
        );
    }
    match &manifest {
        Some(m) if m.total_chunks != chunks.len() => warn!(
            "manifest reports {} chunks but chunk log has {}",
            m.total_chunks,
            chunks.len()
        ),
        Some(_) => {}
        None => warn!("index manifest missing; the last build may not have finished"),
    }

    Ok(LoadedIndex {
        vectors,
        chunks,
        manifest,
    })
}

fn read_chunk_log(path: &Path) -> Result<Vec<ChunkRecord>> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut chunks = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: ChunkRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid chunk record", path.display(), lineno + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// The manifest of the current build, if present and readable.
pub fn read_manifest(vault: &Path) -> Option<Manifest> {
    read_manifest_in(&current_dir(vault))
}

fn read_manifest_in(dir: &Path) -> Option<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let data = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("unreadable manifest {}: {e}", path.display());
            None
        }
    }
}
