use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::debug;

/// A markdown note found under the vault root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFile {
    pub path: PathBuf,
    /// Vault-relative POSIX path, e.g. `projects/alpha.md`.
    pub rel: String,
}

/// Compile glob patterns. `*` may cross `/`, matching shell `fnmatch`.
pub fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
        builder.add(glob);
    }
    builder.build().context("failed to build glob set")
}

/// Vault-relative POSIX form of `path`.
pub fn relative_posix(vault: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(vault).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Recursively list `.md` files under `vault`, skipping excluded paths.
///
/// Hidden files and ignore files get no special treatment; exclusion happens
/// only through `exclude_globs`. Results are sorted by relative path.
pub fn scan_notes(vault: &Path, exclude_globs: &[String]) -> Result<Vec<NoteFile>> {
    let excludes = compile_globs(exclude_globs)?;

    let walker = WalkBuilder::new(vault).standard_filters(false).build();

    let mut notes = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", vault.display()))?;
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(rel) = relative_posix(vault, path) else {
            continue;
        };
        if excludes.is_match(&rel) {
            debug!("excluded {rel}");
            continue;
        }
        notes.push(NoteFile {
            path: path.to_path_buf(),
            rel,
        });
    }

    notes.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(notes)
}
