//! Tag normalization.
//!
//! Tags come from the frontmatter `tags` field, which may be a bare string or
//! a list. The normalized form is lowercase, without a leading `#`, with
//! duplicates removed in first-seen order.

use serde_yaml::Value;

use crate::frontmatter::Frontmatter;

/// Normalize one raw tag. Returns `None` for empty or whitespace-only input.
#[must_use]
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.to_lowercase())
}

/// Derive the canonical tag set from a frontmatter mapping.
///
/// Values of any other shape (numbers, maps, ...) yield an empty set.
/// Non-string items inside a list are skipped.
#[must_use]
pub fn normalize_tags(frontmatter: &Frontmatter) -> Vec<String> {
    let candidates: Vec<&str> = match frontmatter.get("tags") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Sequence(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    dedup_normalized(candidates)
}

/// Normalize and deduplicate a list of raw tags, keeping first-seen order.
#[must_use]
pub fn dedup_normalized<'a, I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in raw.into_iter().filter_map(normalize_tag) {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
