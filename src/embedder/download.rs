/// Local model download from HuggingFace.
///
/// Fetches the ONNX export, tokenizer and config of `rag.embed_model` into
/// the models directory on first use. Files already present are skipped.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const HF_BASE: &str = "https://huggingface.co";

/// Required files: local name and path inside the model repository.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
];

/// Directory for one model: `sentence-transformers/all-MiniLM-L6-v2`
/// becomes `<models_dir>/sentence-transformers--all-MiniLM-L6-v2`.
#[must_use]
pub fn model_dir_for(models_dir: &Path, model: &str) -> PathBuf {
    models_dir.join(model.replace('/', "--"))
}

#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Make sure every model file exists locally, downloading what is missing.
///
/// Returns the model directory.
pub fn ensure_model(models_dir: &Path, model: &str) -> Result<PathBuf> {
    let model_dir = model_dir_for(models_dir, model);
    fs::create_dir_all(&model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(&model_dir) {
        info!("Model files found in {}", model_dir.display());
        return Ok(model_dir);
    }

    info!("Downloading {model} from HuggingFace (one-time)");
    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);
        if dest.exists() {
            continue;
        }

        let url = format!("{HF_BASE}/{model}/resolve/main/{url_path}");
        info!("Downloading {filename}");
        download_file(&dest, &url).with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(model_dir)
}

fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);

    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    } else {
        ProgressBar::new_spinner()
    };

    let bytes = resp.bytes().context("failed to read response body")?;

    // Write under a temporary name so an interrupted download is not mistaken for a model.
    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;
    file.write_all(&bytes).context("failed to write file")?;
    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", dest.display()))?;

    pb.set_position(bytes.len() as u64);
    pb.finish_and_clear();
    Ok(())
}
