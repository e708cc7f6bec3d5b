/// Error taxonomy for vault operations.
///
/// Configuration- and provider-level failures abort the current operation and
/// carry the path or key involved so they can be shown verbatim. Parsing-level
/// problems (frontmatter, tags) never reach this type; they degrade to empty
/// values instead.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    /// The vault has no `_ai/config.yaml`.
    #[error("config not found at {}. Run `vaultrag init <vault>` first", path.display())]
    ConfigNotFound { path: PathBuf },

    /// A query was attempted before any build.
    #[error("index not found at {}. Run `vaultrag index <vault>` first", path.display())]
    IndexNotFound { path: PathBuf },

    /// The index was built by a different embedding backend or model.
    #[error("index was built with {built} but the active embedder is {active}. Run `vaultrag index <vault>` to rebuild")]
    BackendMismatch { built: String, active: String },

    #[error("unsupported provider type: {kind}")]
    UnsupportedProvider { kind: String },

    /// Remote provider selected but the credential variable is unset or empty.
    #[error("missing credential: environment variable {env} is not set")]
    MissingCredential { env: String },

    /// The text-generation stream failed after it started.
    #[error("generation stream failed: {0}")]
    GenerationStream(String),

    #[error("path escapes the vault: {path}")]
    PathOutsideVault { path: String },

    #[error("only markdown notes are supported: {path}")]
    NotMarkdown { path: String },

    /// A write outside `writeback.allow_globs`.
    #[error("writes to {path} are not allowed by writeback.allow_globs")]
    WriteNotAllowed { path: String },
}
