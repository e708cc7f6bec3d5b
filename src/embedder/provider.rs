//! Embedding backend selection.
//!
//! The provider is chosen once per invocation from the vault config and the
//! environment, then passed by reference to every build and query.

use anyhow::{Context, Result};
use tracing::info;

use super::download::ensure_model;
use super::hash::{HASH_MODEL_NAME, HashEmbedder};
use super::onnx::OnnxEmbedder;
use super::openai::OpenAiEmbedder;
use super::{Embedder, EmbedderError, ProviderKind};
use crate::config::{Config, EmbeddingBackend};
use crate::error::VaultError;

/// Dimensionality of the hashing embedder when selected by name.
const HASH_DIMENSIONS: usize = 384;

pub enum EmbeddingProvider {
    Remote(OpenAiEmbedder),
    Local(Box<dyn Embedder>),
}

/// Decide the backend kind.
///
/// `auto` goes remote only when a credential is present; `openai` demands one.
pub fn choose_backend(
    backend: EmbeddingBackend,
    has_credential: bool,
    credential_env: &str,
) -> Result<ProviderKind> {
    match backend {
        EmbeddingBackend::Auto if has_credential => Ok(ProviderKind::Openai),
        EmbeddingBackend::Auto | EmbeddingBackend::Local => Ok(ProviderKind::Local),
        EmbeddingBackend::Openai if has_credential => Ok(ProviderKind::Openai),
        EmbeddingBackend::Openai => Err(VaultError::MissingCredential {
            env: credential_env.to_string(),
        }
        .into()),
    }
}

/// Build the local backend named by `rag.embed_model`.
pub fn local_embedder(cfg: &Config) -> Result<Box<dyn Embedder>> {
    let model = cfg.rag.embed_model.as_str();
    if model == HASH_MODEL_NAME {
        return Ok(Box::new(HashEmbedder::new(HASH_DIMENSIONS)));
    }

    let model_dir = ensure_model(&cfg.models_dir(), model)?;
    let embedder = OnnxEmbedder::new(&model_dir, model)
        .with_context(|| format!("failed to load local model {model}"))?;
    Ok(Box::new(embedder))
}

impl EmbeddingProvider {
    /// Select the backend for this invocation.
    pub fn select(cfg: &Config) -> Result<Self> {
        let key = cfg.api_key();
        let kind = choose_backend(
            cfg.rag.embedding_backend,
            key.is_some(),
            &cfg.provider.api_key_env,
        )?;

        let provider = match (kind, key) {
            (ProviderKind::Openai, Some(key)) => Self::Remote(OpenAiEmbedder::new(
                key,
                cfg.rag.openai_embedding_model.clone(),
                cfg.rag.openai_dimensions,
            )?),
            _ => Self::Local(local_embedder(cfg)?),
        };

        info!(
            "Embedding provider: {} ({})",
            provider.kind(),
            provider.model_name()
        );
        Ok(provider)
    }

    fn inner(&self) -> &dyn Embedder {
        match self {
            Self::Remote(e) => e as &dyn Embedder,
            Self::Local(e) => e.as_ref(),
        }
    }
}

impl Embedder for EmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        self.inner().embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        self.inner().dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    fn kind(&self) -> ProviderKind {
        match self {
            Self::Remote(_) => ProviderKind::Openai,
            Self::Local(_) => ProviderKind::Local,
        }
    }
}
