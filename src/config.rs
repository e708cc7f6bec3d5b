/// Configuration module for vaultrag.
///
/// Each vault carries its own `_ai/config.yaml`. `init` writes the defaults
/// once; `Config::load` reads them back, filling any missing field with its
/// default.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::VaultError;

/// Config file location relative to the vault root.
pub const CONFIG_REL_PATH: &str = "_ai/config.yaml";

// ── Default value functions ──────────────────────────────────────────

fn default_provider_type() -> String {
    "openai".to_string()
}

fn default_generation_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_embed_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_openai_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_dimensions() -> usize {
    1536
}

fn default_chunk_chars() -> usize {
    1200
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    8
}

fn default_exclude_globs() -> Vec<String> {
    vec!["_ai/**".to_string(), ".obsidian/**".to_string()]
}

fn default_thread_dir() -> String {
    "_ai/threads".to_string()
}

fn default_target() -> String {
    "daily".to_string()
}

fn default_allow_globs() -> Vec<String> {
    vec![
        "daily/**".to_string(),
        "_ai/threads/**".to_string(),
        "projects/**".to_string(),
    ]
}

fn default_redact_patterns() -> Vec<String> {
    vec![
        r"(?i)passport\s*\d+".to_string(),
        r"(?i)api[_-]?key\s*[:=]\s*\S+".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_message_template() -> String {
    "ai:{command} {target} (k={k})".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Absolute vault path recorded at `init` time (informational).
    #[serde(default)]
    pub vault_path: String,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub writeback: WritebackConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub git: GitConfig,
}

/// Text-generation provider; its credential is shared with remote embeddings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    #[serde(rename = "type", default = "default_provider_type")]
    pub kind: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Which embedding backend a build or query may use.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Remote when the credential is present, local otherwise.
    #[default]
    Auto,
    Openai,
    Local,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    /// Local model name (HuggingFace repo id), or `hash` for the offline hashing embedder.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    #[serde(default = "default_openai_embedding_model")]
    pub openai_embedding_model: String,

    /// Remote vector size; needed when a build yields zero chunks.
    #[serde(default = "default_openai_dimensions")]
    pub openai_dimensions: usize,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,

    /// Where downloaded local models live. Defaults to the user cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_dir: Option<String>,

    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WritebackConfig {
    #[serde(default = "default_thread_dir")]
    pub thread_dir: String,

    #[serde(default = "default_target")]
    pub default_target: String,

    #[serde(default = "default_allow_globs")]
    pub allow_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrivacyConfig {
    #[serde(default = "default_redact_patterns")]
    pub redact: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_true")]
    pub auto_commit: bool,

    #[serde(default = "default_message_template")]
    pub message_template: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_path: String::new(),
            provider: ProviderConfig::default(),
            rag: RagConfig::default(),
            writeback: WritebackConfig::default(),
            privacy: PrivacyConfig::default(),
            git: GitConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_type(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embed_model: default_embed_model(),
            openai_embedding_model: default_openai_embedding_model(),
            openai_dimensions: default_openai_dimensions(),
            embedding_backend: EmbeddingBackend::default(),
            models_dir: None,
            chunk_chars: default_chunk_chars(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

impl Default for WritebackConfig {
    fn default() -> Self {
        Self {
            thread_dir: default_thread_dir(),
            default_target: default_target(),
            allow_globs: default_allow_globs(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            redact: default_redact_patterns(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            auto_commit: default_true(),
            message_template: default_message_template(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

/// Path of the config file for a vault.
#[must_use]
pub fn config_path(vault: &Path) -> PathBuf {
    vault.join(CONFIG_REL_PATH)
}

/// Initialize a vault: write the default config (never overwriting an
/// existing one) and create the thread and daily folders.
///
/// Returns the config file path.
pub fn init(vault: &Path) -> Result<PathBuf> {
    let vault = std::path::absolute(vault)
        .with_context(|| format!("failed to resolve vault path: {}", vault.display()))?;
    let path = config_path(&vault);

    if path.exists() {
        info!("Config already present at {}", path.display());
        return Ok(path);
    }

    let cfg = Config {
        vault_path: vault.to_string_lossy().replace('\\', "/"),
        ..Config::default()
    };
    cfg.save(&path)?;

    fs::create_dir_all(vault.join(&cfg.writeback.thread_dir))
        .context("failed to create thread directory")?;
    fs::create_dir_all(vault.join(&cfg.writeback.default_target))
        .context("failed to create capture directory")?;

    info!("Initialized config at {}", path.display());
    Ok(path)
}

impl Config {
    /// Load the configuration of an initialized vault.
    ///
    /// Fails with [`VaultError::ConfigNotFound`] if the vault was never initialized.
    pub fn load(vault: &Path) -> Result<Self> {
        let path = config_path(vault);
        if !path.exists() {
            return Err(VaultError::ConfigNotFound { path }.into());
        }

        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        // An empty file parses to null; treat it as all defaults.
        let cfg: Config = if data.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&data)
                .with_context(|| format!("invalid config: {}", path.display()))?
        };

        cfg.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(cfg)
    }

    /// Save configuration as YAML, creating parent folders.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_yaml::to_string(self).context("failed to serialize config")?;
        fs::write(path, data).with_context(|| format!("failed to write config: {}", path.display()))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.rag.chunk_chars > 0, "rag.chunk_chars must be positive");
        anyhow::ensure!(
            self.rag.chunk_overlap < self.rag.chunk_chars,
            "rag.chunk_overlap ({}) must be smaller than rag.chunk_chars ({})",
            self.rag.chunk_overlap,
            self.rag.chunk_chars
        );
        anyhow::ensure!(self.rag.top_k > 0, "rag.top_k must be positive");
        anyhow::ensure!(
            self.rag.openai_dimensions > 0,
            "rag.openai_dimensions must be positive"
        );
        Ok(())
    }

    /// Read the provider credential from the environment, if set and non-empty.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Directory holding downloaded local models.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        match &self.rag.models_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vaultrag")
                .join("models"),
        }
    }
}

impl WritebackConfig {
    /// Fail with [`VaultError::WriteNotAllowed`] unless the vault-relative
    /// path `rel` matches one of `allow_globs`.
    pub fn ensure_writable(&self, rel: &str) -> Result<()> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.allow_globs {
            builder.add(
                Glob::new(pattern)
                    .with_context(|| format!("invalid writeback.allow_globs pattern: {pattern}"))?,
            );
        }
        let allowed = builder
            .build()
            .context("failed to build writeback globs")?
            .is_match(rel);
        if !allowed {
            return Err(VaultError::WriteNotAllowed {
                path: rel.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
