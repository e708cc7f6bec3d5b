//! Overlapping fixed-size chunking with heading attribution.
//!
//! All offsets are character (Unicode scalar) offsets into the note body,
//! never byte offsets, so citations stay meaningful for non-ASCII notes.

/// A markdown heading and the character offset of its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub offset: usize,
    /// Normalized form, e.g. `"## Setup"`.
    pub text: String,
}

/// One chunk of a note body.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub start: usize,
    pub end: usize,
    pub heading: String,
    pub text: String,
}

/// Split a text of `char_len` characters into half-open spans of at most
/// `chunk_chars`, each overlapping the previous by `overlap`.
///
/// The last span always ends at `char_len`; an empty text yields no spans.
/// `overlap` is clamped below `chunk_chars` so the walk always advances.
pub fn chunk_spans(char_len: usize, chunk_chars: usize, overlap: usize) -> Vec<(usize, usize)> {
    let size = chunk_chars.max(1);
    let overlap = overlap.min(size - 1);

    let mut spans = Vec::new();
    let mut start = 0;
    while start < char_len {
        let end = char_len.min(start + size);
        spans.push((start, end));
        if end == char_len {
            break;
        }
        start = end.saturating_sub(overlap);
    }
    spans
}

/// Collect heading lines (lines starting with `#`) with their offsets.
pub fn extract_headings(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.starts_with('#') {
            let level = line.len() - line.trim_start_matches('#').len();
            let title = line.trim_matches('#').trim();
            headings.push(Heading {
                offset,
                text: format!("{} {}", "#".repeat(level), title),
            });
        }
        offset += line.chars().count();
    }

    headings
}

/// The last heading at or before `pos`, or `""` if there is none.
pub fn heading_for_offset(headings: &[Heading], pos: usize) -> &str {
    let idx = headings.partition_point(|h| h.offset <= pos);
    match idx {
        0 => "",
        i => &headings[i - 1].text,
    }
}

/// Chunk a body and attach the nearest preceding heading to each chunk.
pub fn chunk_document(body: &str, chunk_chars: usize, overlap: usize) -> Vec<TextChunk> {
    // Byte position of every char boundary, plus the end of the text.
    let bounds: Vec<usize> = body
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(body.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let headings = extract_headings(body);

    chunk_spans(char_len, chunk_chars, overlap)
        .into_iter()
        .map(|(start, end)| TextChunk {
            start,
            end,
            heading: heading_for_offset(&headings, start).to_string(),
            text: body[bounds[start]..bounds[end]].to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_overlap() {
        let spans = chunk_spans(2500, 1200, 200);
        assert_eq!(spans, vec![(0, 1200), (1000, 2200), (2000, 2500)]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_spans(0, 1200, 200).is_empty());
        assert!(chunk_document("", 1200, 200).is_empty());
    }

    #[test]
    fn test_short_text_single_span() {
        assert_eq!(chunk_spans(10, 1200, 200), vec![(0, 10)]);
        assert_eq!(chunk_spans(1200, 1200, 200), vec![(0, 1200)]);
    }

    #[test]
    fn test_span_properties_over_grid() {
        for n in 0..120usize {
            for size in 1..15usize {
                for overlap in 0..size {
                    let spans = chunk_spans(n, size, overlap);
                    if n == 0 {
                        assert!(spans.is_empty());
                        continue;
                    }

                    assert_eq!(spans[0].0, 0);
                    assert_eq!(spans.last().unwrap().1, n, "n={n} C={size} O={overlap}");
                    for pair in spans.windows(2) {
                        // Monotone starts and no gaps.
                        assert!(pair[1].0 >= pair[0].0);
                        assert!(pair[1].0 <= pair[0].1);
                    }

                    let expected = if n > size {
                        (n - overlap).div_ceil(size - overlap)
                    } else {
                        1
                    };
                    assert_eq!(spans.len(), expected, "n={n} C={size} O={overlap}");
                }
            }
        }
    }

    #[test]
    fn test_extract_headings() {
        let text = "intro\n# Title\nbody\n### Deep   Dive ###\nmore\n";
        let headings = extract_headings(text);
        assert_eq!(
            headings,
            vec![
                Heading {
                    offset: 6,
                    text: "# Title".into()
                },
                Heading {
                    offset: 19,
                    text: "### Deep   Dive ###".into()
                },
            ]
        );
    }

    #[test]
    fn test_heading_for_offset() {
        let headings = extract_headings("# A\ntext\n## B\ntext\n");
        assert_eq!(heading_for_offset(&headings, 0), "# A");
        assert_eq!(heading_for_offset(&headings, 8), "# A");
        assert_eq!(heading_for_offset(&headings, 9), "## B");
        assert_eq!(heading_for_offset(&[], 5), "");

        let late = extract_headings("preamble\n# Late\n");
        assert_eq!(heading_for_offset(&late, 3), "");
    }

    #[test]
    fn test_chunk_document_uses_char_offsets() {
        let body = "# Über\n".to_string() + &"é".repeat(20);
        let chunks = chunk_document(&body, 10, 2);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].text.chars().count(), 10);
        assert_eq!(chunks.last().unwrap().end, body.chars().count());
        for c in &chunks {
            assert_eq!(c.heading, "# Über");
            assert_eq!(c.text.chars().count(), c.end - c.start);
        }
    }
}
