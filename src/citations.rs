//! Citation lines for retrieval results.
use crate::retriever::SearchHit;

/// Format an integer with `,` thousands separators.
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `[rank] file heading (chars start–end)`.
///
/// An empty heading leaves two spaces between file and span.
#[must_use]
pub fn format_citation(hit: &SearchHit) -> String {
    format!(
        "[{}] {} {} (chars {}–{})",
        hit.rank,
        hit.chunk.file,
        hit.chunk.heading,
        group_thousands(hit.chunk.start),
        group_thousands(hit.chunk.end)
    )
}

/// One citation per line, in result order.
#[must_use]
pub fn format_citations(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(format_citation)
        .collect::<Vec<_>>()
        .join("\n")
}
