//! # vaultrag — vault-aware RAG assistant
//!
//! Indexes a folder of markdown notes into a local vector index and answers
//! queries with ranked, cited passages.
//!
//! ## Architecture
//!
//! - **[`config`]** — Per-vault `_ai/config.yaml`: init, load, validation
//! - **[`frontmatter`]** / **[`tags`]** — YAML frontmatter parsing and tag normalization
//! - **[`indexer`]** — Vault scan, character chunking with headings, full rebuilds
//! - **[`embedder`]** — Embedding backends (OpenAI, local ONNX, hashing) and provider selection
//! - **[`store`]** — Artifact set: sqlite-vec vector index, chunk log, manifest
//! - **[`retriever`]** / **[`citations`]** — Filtered top-k search and citation lines
//! - **[`vault`]** — Build, retrieve, note mutations, frontmatter enrichment, doctor
//! - **[`assistant`]** — Ask / chat / plan / capture flows over
//!   [`threads`], [`redact`], [`generation`] and [`gitwrap`]

pub mod assistant;
pub mod citations;
pub mod config;
pub mod embedder;
pub mod error;
pub mod frontmatter;
pub mod generation;
pub mod gitwrap;
pub mod indexer;
pub mod redact;
pub mod retriever;
pub mod store;
pub mod tags;
pub mod threads;
pub mod vault;

pub use error::VaultError;
