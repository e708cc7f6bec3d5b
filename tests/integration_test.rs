/// End-to-end tests for the vault pipeline.
///
/// Covers the complete flow:
///   init → scan/chunk → embed → artifacts → retrieve → cite
use std::fs;
use std::path::Path;

use tempfile::tempdir;
use vaultrag::citations::format_citations;
use vaultrag::config::{self, Config};
use vaultrag::embedder::hash::HashEmbedder;
use vaultrag::embedder::{Embedder, EmbedderError, l2_normalize};
use vaultrag::error::VaultError;
use vaultrag::retriever::RetrieveOptions;
use vaultrag::store;
use vaultrag::vault::{self, Vault};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn hash_vault(root: &Path) -> Vault<HashEmbedder> {
    config::init(root).unwrap();
    let cfg = Config::load(root).unwrap();
    Vault::with_embedder(root, cfg, HashEmbedder::default())
}

fn tagged(k: usize, tag: &str) -> RetrieveOptions {
    RetrieveOptions {
        k: Some(k),
        tag: Some(tag.to_string()),
        ..Default::default()
    }
}

/// Scores by how many `!` a text has: more bangs, closer to a loud query.
struct BangEmbedder;

impl Embedder for BangEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![t.matches('!').count() as f32, 1.0];
                l2_normalize(&mut v);
                v
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "bang"
    }
}

/// Notes `n01.md`..`n12.md`; note `i` holds `i` bangs. `tag` goes on `tagged`.
fn bang_vault(root: &Path, tagged: &[usize]) -> Vault<BangEmbedder> {
    for i in 1..=12 {
        let fm = if tagged.contains(&i) {
            "---\ntags: [rare]\n---\n"
        } else {
            ""
        };
        write(root, &format!("n{i:02}.md"), &format!("{fm}{}", "!".repeat(i)));
    }
    Vault::with_embedder(root, Config::default(), BangEmbedder)
}

#[test]
fn test_tag_filter_end_to_end() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let vault = hash_vault(root);

    write(
        root,
        "projects/alpha.md",
        "---\ntitle: Alpha\ntags: [ProjectX]\n---\n# Alpha\n\nAlpha content about embeddings.\n",
    );
    write(
        root,
        "beta.md",
        "---\ntags: \"#projectx\"\n---\nBeta notes on embeddings and retrieval.\n",
    );
    write(root, "gamma.md", "Gamma grocery list, milk and bread.\n");

    let manifest = vault.build().unwrap();
    assert_eq!(manifest.total_chunks, 3);
    assert_eq!(manifest.model, "hash");
    assert_eq!(manifest.dimensions, 384);

    let hits = vault.retrieve("embeddings", &tagged(5, "projectx")).unwrap();
    let mut files: Vec<&str> = hits.iter().map(|h| h.chunk.file.as_str()).collect();
    files.sort_unstable();
    assert_eq!(files, vec!["beta.md", "projects/alpha.md"]);

    // Leading '#' and case do not matter on the query side either.
    let again = vault.retrieve("embeddings", &tagged(5, "#ProjectX")).unwrap();
    assert_eq!(again, hits);

    let none = vault.retrieve("embeddings", &tagged(5, "untagged")).unwrap();
    assert!(none.is_empty());

    let citations = format_citations(&hits);
    assert!(citations.starts_with("[1] "));
    assert_eq!(citations.lines().count(), 2);
}

#[test]
fn test_chunk_log_matches_vector_index() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let vault = hash_vault(root);

    let long: String = (0..400).map(|i| format!("word{i} ")).collect();
    write(root, "long.md", &format!("# Long\n\n{long}"));
    write(root, "short.md", "tiny");
    write(root, "_ai/threads/ignored.md", "threads are excluded");

    let manifest = vault.build().unwrap();
    let index = store::load(root).unwrap();

    assert_eq!(index.vectors.len().unwrap(), index.chunks.len());
    assert_eq!(manifest.total_chunks, index.chunks.len());
    assert!(index.chunks.len() > 2, "long note should split into several chunks");
    assert!(index.chunks.iter().all(|c| c.file != "_ai/threads/ignored.md"));
    assert_eq!(index.manifest.unwrap(), manifest);

    let log = fs::read_to_string(store::index_dir(root).join(store::CHUNKS_FILE)).unwrap();
    assert_eq!(log.lines().count(), index.chunks.len());
    assert!(!root.join("_ai/index.staging").exists());
}

#[test]
fn test_unfiltered_results_are_similarity_ordered() {
    let dir = tempdir().unwrap();
    let vault = bang_vault(dir.path(), &[]);
    vault.build().unwrap();

    let opts = RetrieveOptions {
        k: Some(4),
        ..Default::default()
    };
    let hits = vault.retrieve(&"!".repeat(20), &opts).unwrap();
    let files: Vec<&str> = hits.iter().map(|h| h.chunk.file.as_str()).collect();
    assert_eq!(files, vec!["n12.md", "n11.md", "n10.md", "n09.md"]);
    let ranks: Vec<usize> = hits.iter().map(|h| h.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_filter_keeps_order_and_reranks() {
    let dir = tempdir().unwrap();
    let vault = bang_vault(dir.path(), &[12, 10, 8]);
    vault.build().unwrap();

    let hits = vault.retrieve(&"!".repeat(20), &tagged(2, "rare")).unwrap();
    let files: Vec<&str> = hits.iter().map(|h| h.chunk.file.as_str()).collect();
    assert_eq!(files, vec!["n12.md", "n10.md"]);
    assert_eq!(hits[0].rank, 1);
    assert_eq!(hits[1].rank, 2);
}

#[test]
fn test_match_at_last_candidate_slot_is_kept() {
    let dir = tempdir().unwrap();
    // k=2 fetches 6 candidates (n12..n07); n07 is the sixth.
    let vault = bang_vault(dir.path(), &[12, 7]);
    vault.build().unwrap();

    let hits = vault.retrieve(&"!".repeat(20), &tagged(2, "rare")).unwrap();
    let files: Vec<&str> = hits.iter().map(|h| h.chunk.file.as_str()).collect();
    assert_eq!(files, vec!["n12.md", "n07.md"]);
    assert_eq!(hits[1].rank, 2);
}

#[test]
fn test_matches_outside_candidate_window_are_missed() {
    let dir = tempdir().unwrap();
    // k=2 fetches 6 candidates (n12..n07); n06 falls outside.
    let vault = bang_vault(dir.path(), &[12, 6]);
    vault.build().unwrap();

    let loud = "!".repeat(20);
    let hits = vault.retrieve(&loud, &tagged(2, "rare")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.file, "n12.md");

    let wide = RetrieveOptions {
        oversample: Some(12),
        ..tagged(2, "rare")
    };
    let hits = vault.retrieve(&loud, &wide).unwrap();
    let files: Vec<&str> = hits.iter().map(|h| h.chunk.file.as_str()).collect();
    assert_eq!(files, vec!["n12.md", "n06.md"]);
}

#[test]
fn test_path_filter() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let vault = hash_vault(root);
    write(root, "projects/deep/a.md", "shared words here");
    write(root, "b.md", "shared words here");
    vault.build().unwrap();

    let opts = RetrieveOptions {
        k: Some(5),
        path_glob: Some("projects/*".into()),
        ..Default::default()
    };
    let hits = vault.retrieve("shared words", &opts).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.file, "projects/deep/a.md");
}

#[test]
fn test_malformed_frontmatter_is_indexed_untagged() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let vault = hash_vault(root);
    write(root, "broken.md", "---\ntags: [unclosed\n---\nStill searchable body.\n");
    write(root, "open.md", "---\ntags: [x]\nno closing delimiter\n");

    vault.build().unwrap();
    let index = store::load(root).unwrap();
    assert_eq!(index.chunks.len(), 2);
    assert!(index.chunks.iter().all(|c| c.tags.is_empty()));
}

#[test]
fn test_retrieve_before_build() {
    let dir = tempdir().unwrap();
    let vault = hash_vault(dir.path());
    let err = vault
        .retrieve("anything", &RetrieveOptions::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::IndexNotFound { .. })
    ));
}

/// Same vectors as the hashing embedder, reported as another model.
struct RenamedHash(HashEmbedder);

impl Embedder for RenamedHash {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        self.0.embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }

    fn model_name(&self) -> &str {
        "sentence-transformers/all-MiniLM-L6-v2"
    }
}

#[test]
fn test_query_with_other_backend_is_refused() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "a.md", "shared words here");
    hash_vault(root).build().unwrap();

    let cfg = Config::load(root).unwrap();
    let other = Vault::with_embedder(root, cfg, RenamedHash(HashEmbedder::default()));
    assert_eq!(other.embedder().dimensions(), 384);

    let err = other
        .retrieve("shared", &RetrieveOptions::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::BackendMismatch { .. })
    ));

    // A rebuild with the new backend makes it queryable again.
    other.build().unwrap();
    assert_eq!(
        other
            .retrieve("shared", &RetrieveOptions::default())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_note_mutations_reindex() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let vault = hash_vault(root);

    let m = vault
        .create_note("projects/new.md", "# New\n\nFresh idea about gardens.\n")
        .unwrap();
    assert_eq!(m.total_chunks, 1);

    vault.move_note("projects/new.md", "archive/new.md").unwrap();
    let index = store::load(root).unwrap();
    assert_eq!(index.chunks[0].file, "archive/new.md");

    let m = vault.delete_note("archive/new.md").unwrap();
    assert_eq!(m.total_chunks, 0);
    assert!(store::load(root).unwrap().chunks.is_empty());

    let err = vault.create_note("../escape.md", "x").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::PathOutsideVault { .. })
    ));
}

#[test]
fn test_enrich_then_doctor() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let vault = hash_vault(root);
    write(root, "projects/plan.md", "Body only.\n");

    let dry = vault.enrich_frontmatter(false).unwrap();
    assert_eq!(dry.changed, vec!["projects/plan.md".to_string()]);
    assert_eq!(fs::read_to_string(root.join("projects/plan.md")).unwrap(), "Body only.\n");

    vault.enrich_frontmatter(true).unwrap();
    let text = fs::read_to_string(root.join("projects/plan.md")).unwrap();
    assert!(text.contains("title: plan"));
    assert!(text.ends_with("Body only.\n"));
    assert!(vault.enrich_frontmatter(false).unwrap().changed.is_empty());

    vault.build().unwrap();
    let index = store::load(root).unwrap();
    assert_eq!(index.chunks[0].tags, vec!["projects".to_string()]);

    let report = vault::doctor(root);
    assert!(report.config_error.is_none());
    assert!(report.index_present);
    assert_eq!(report.manifest.unwrap().total_chunks, 1);
}
