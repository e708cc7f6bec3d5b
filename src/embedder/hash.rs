/// Deterministic feature-hashing embedder.
///
/// Each lowercase word is hashed into one of `dimensions` buckets with a
/// signed weight, so texts sharing words get similar vectors. Needs no model
/// files or network, which makes it the offline backend and the test double.
use super::{Embedder, EmbedderError, l2_normalize};

/// `rag.embed_model` value that selects this embedder.
pub const HASH_MODEL_NAME: &str = "hash";

pub struct HashEmbedder {
    pub dimensions: usize,
}

impl HashEmbedder {
    /// Create a new `HashEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut any = false;
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
            any = true;
        }

        if !any {
            // No words at all: pin to a fixed direction so the vector stays unit length.
            embedding[0] = 1.0;
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

/// 64-bit FNV-1a; stable across platforms and toolchains.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }
}
