use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::embedder::{Embedder, ProviderKind};

/// One chunk-log line. Its position in the log is its vector ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Vault-relative POSIX path of the note.
    pub file: String,
    pub chunk_id: String,
    /// Character offsets into the note body, half-open.
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// How the current artifact set was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub model: String,
    pub provider: ProviderKind,
    #[serde(default)]
    pub dimensions: usize,
    pub total_chunks: usize,
    /// Unix seconds.
    pub created_at: f64,
}

impl Manifest {
    /// Describe a build made with `embedder`, stamped now.
    pub fn for_build<E: Embedder + ?Sized>(
        embedder: &E,
        dimensions: usize,
        total_chunks: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            model: embedder.model_name().to_string(),
            provider: embedder.kind(),
            dimensions,
            total_chunks,
            created_at: now.timestamp_micros() as f64 / 1_000_000.0,
        }
    }
}
