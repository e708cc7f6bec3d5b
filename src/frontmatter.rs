/// YAML frontmatter parsing and generation for Markdown notes.
///
/// Parsing never fails: a missing, unterminated or malformed block degrades
/// to an empty mapping so one bad note cannot abort a whole-vault rebuild.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use tracing::debug;

/// Insertion-ordered frontmatter mapping.
pub type Frontmatter = Mapping;

/// Marker line opening and closing a frontmatter block.
pub const DELIMITER: &str = "---";

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

/// Split a note into `(frontmatter, body)`.
///
/// If the text does not open with a delimiter line, or the closing delimiter
/// is missing, the mapping is empty and the body is the original text. If the
/// delimited YAML is invalid or not a mapping, the mapping is empty but the
/// block is still stripped from the body.
pub fn parse(text: &str) -> (Frontmatter, String) {
    let mut lines = text.split_inclusive('\n');

    let opens = lines.next().is_some_and(is_delimiter);
    if !opens {
        return (Mapping::new(), text.to_string());
    }

    let yaml_start = text.find('\n').map_or(text.len(), |i| i + 1);
    let mut offset = yaml_start;

    for line in lines {
        if is_delimiter(line) {
            let yaml = &text[yaml_start..offset];
            let body = &text[offset + line.len()..];
            return (parse_mapping(yaml), body.to_string());
        }
        offset += line.len();
    }

    debug!("frontmatter not closed; treating note as body only");
    (Mapping::new(), text.to_string())
}

fn parse_mapping(yaml: &str) -> Frontmatter {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mapping)) => mapping,
        Ok(Value::Null) => Mapping::new(),
        Ok(_) => {
            debug!("frontmatter is not a mapping; ignoring");
            Mapping::new()
        }
        Err(e) => {
            debug!("malformed frontmatter: {e}");
            Mapping::new()
        }
    }
}

/// Render a mapping and body back into note text.
///
/// An empty mapping renders the body unchanged.
pub fn render(frontmatter: &Frontmatter, body: &str) -> Result<String> {
    if frontmatter.is_empty() {
        return Ok(body.to_string());
    }
    let yaml = serde_yaml::to_string(frontmatter).context("failed to serialize frontmatter")?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{body}"))
}

/// Look up a string value by key.
#[must_use]
pub fn get_str<'a>(frontmatter: &'a Frontmatter, key: &str) -> Option<&'a str> {
    frontmatter.get(key).and_then(Value::as_str)
}

/// Insert `value` under `key` unless the key is already present.
///
/// Returns `true` if the mapping changed.
pub fn insert_missing(frontmatter: &mut Frontmatter, key: &str, value: Value) -> bool {
    let key = Value::String(key.to_string());
    if frontmatter.contains_key(&key) {
        return false;
    }
    frontmatter.insert(key, value);
    true
}

/// Rewrite a note file with the given frontmatter and body.
pub fn write_note(file_path: &Path, frontmatter: &Frontmatter, body: &str) -> Result<()> {
    let content = render(frontmatter, body)?;
    fs::write(file_path, content)
        .with_context(|| format!("failed to write {}", file_path.display()))
}
