//! Heading-aware text chunker producing dotted tree paths.
//!
//! Splits document text into sections at markdown-style heading lines and
//! into paragraphs at blank lines. Paragraphs are accumulated into chunks
//! up to a `max_chars` budget; a single oversized paragraph is hard-split
//! at whitespace, snapped to UTF-8 char boundaries.
//!
//! Paths encode the tree position: `<base>.s<section>.p<piece>`, both
//! counters 1-based, so sibling chunks share a section prefix and the
//! hierarchy queries get real structure to work with. Offsets are byte
//! positions into the original text.

use trellis_core::error::Result;
use trellis_core::models::{ChunkWithPath, Metadata};
use trellis_core::path::ChunkPath;
use trellis_core::pipeline::Chunker;

/// Chunker splitting on headings and blank lines under a size budget.
pub struct HeadingChunker {
    max_chars: usize,
}

impl HeadingChunker {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[derive(Debug)]
struct Paragraph {
    text: String,
    start: usize,
    end: usize,
}

impl Chunker for HeadingChunker {
    fn chunk(&self, text: &str, base: &ChunkPath) -> Result<Vec<ChunkWithPath>> {
        let sections = split_sections(text);

        let mut chunks: Vec<ChunkWithPath> = Vec::new();
        let mut section_no = 0usize;
        let mut index = 0i64;

        for paragraphs in &sections {
            if paragraphs.is_empty() {
                continue;
            }
            section_no += 1;
            let section_path = base.child(format!("s{section_no}"))?;

            let mut piece_no = 0usize;
            let mut buffer: Vec<&Paragraph> = Vec::new();
            let mut buffer_len = 0usize;

            macro_rules! flush {
                () => {
                    if !buffer.is_empty() {
                        piece_no += 1;
                        let content = buffer
                            .iter()
                            .map(|p| p.text.as_str())
                            .collect::<Vec<_>>()
                            .join("\n\n");
                        chunks.push(ChunkWithPath {
                            content,
                            path: section_path.child(format!("p{piece_no}"))?,
                            start_offset: Some(buffer[0].start as i64),
                            end_offset: Some(buffer[buffer.len() - 1].end as i64),
                            index,
                            metadata: Metadata::new(),
                        });
                        index += 1;
                        buffer.clear();
                        buffer_len = 0;
                    }
                };
            }

            for para in paragraphs {
                if para.text.len() > self.max_chars {
                    flush!();
                    for (offset, piece) in hard_split(&para.text, self.max_chars) {
                        piece_no += 1;
                        let start = para.start + offset;
                        chunks.push(ChunkWithPath {
                            content: piece.clone(),
                            path: section_path.child(format!("p{piece_no}"))?,
                            start_offset: Some(start as i64),
                            end_offset: Some((start + piece.len()) as i64),
                            index,
                            metadata: Metadata::new(),
                        });
                        index += 1;
                    }
                    continue;
                }

                let would_be = if buffer.is_empty() {
                    para.text.len()
                } else {
                    buffer_len + 2 + para.text.len()
                };
                if would_be > self.max_chars {
                    flush!();
                }
                buffer_len = if buffer.is_empty() {
                    para.text.len()
                } else {
                    buffer_len + 2 + para.text.len()
                };
                buffer.push(para);
            }
            flush!();
        }

        // Non-empty text always yields at least one chunk.
        if chunks.is_empty() && !text.trim().is_empty() {
            chunks.push(ChunkWithPath {
                content: text.trim().to_string(),
                path: base.child("s1")?.child("p1")?,
                start_offset: Some(0),
                end_offset: Some(text.len() as i64),
                index: 0,
                metadata: Metadata::new(),
            });
        }

        Ok(chunks)
    }
}

/// Split text into sections of paragraphs, tracking byte offsets.
///
/// A heading line (leading `#`) closes the current section and becomes the
/// first paragraph of the next one, with the hash markers stripped.
fn split_sections(text: &str) -> Vec<Vec<Paragraph>> {
    let mut sections: Vec<Vec<Paragraph>> = vec![Vec::new()];
    let mut buf = String::new();
    let mut para_start = 0usize;
    let mut para_end = 0usize;
    let mut pos = 0usize;

    macro_rules! flush_para {
        () => {
            if !buf.is_empty() {
                sections.last_mut().unwrap().push(Paragraph {
                    text: std::mem::take(&mut buf),
                    start: para_start,
                    end: para_end,
                });
            }
        };
    }

    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush_para!();
            continue;
        }

        if trimmed.starts_with('#') {
            flush_para!();
            sections.push(Vec::new());
            let title = trimmed.trim_start_matches('#').trim();
            if !title.is_empty() {
                let offset_in_line = line.find(title).unwrap_or(0);
                sections.last_mut().unwrap().push(Paragraph {
                    text: title.to_string(),
                    start: line_start + offset_in_line,
                    end: line_start + offset_in_line + title.len(),
                });
            }
            continue;
        }

        if buf.is_empty() {
            para_start = line_start + (line.len() - line.trim_start().len());
        } else {
            buf.push('\n');
        }
        buf.push_str(trimmed);
        para_end = line_start + line.trim_end().len();
    }
    flush_para!();

    sections
}

/// Split an oversized paragraph into pieces of at most `max_chars` bytes,
/// preferring whitespace boundaries. Returns byte offsets of each piece
/// within the paragraph.
fn hard_split(text: &str, max_chars: usize) -> Vec<(usize, String)> {
    let mut pieces = Vec::new();
    let mut offset = 0usize;
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            pieces.push((offset, remaining.to_string()));
            break;
        }

        let mut split = snap_to_char_boundary(remaining, max_chars);
        if let Some(ws) = remaining[..split].rfind(char::is_whitespace) {
            let after_ws = ws + remaining[ws..].chars().next().map_or(1, char::len_utf8);
            if after_ws > 0 && after_ws < split {
                split = after_ws;
            }
        }
        if split == 0 {
            // First char is wider than the budget; take it whole.
            split = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }

        let piece = remaining[..split].trim_end();
        if !piece.is_empty() {
            pieces.push((offset, piece.to_string()));
        }
        offset += split;
        remaining = &remaining[split..];
    }

    pieces
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ChunkPath {
        "doc_test".parse().unwrap()
    }

    fn paths(chunks: &[ChunkWithPath]) -> Vec<String> {
        chunks.iter().map(|c| c.path.to_string()).collect()
    }

    #[test]
    fn test_single_paragraph() {
        let chunks = HeadingChunker::new(2000)
            .chunk("Hello, world!", &base())
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].path.to_string(), "doc_test.s1.p1");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_headings_create_sections() {
        let text = "Intro text.\n\n# First\n\nAlpha body.\n\n# Second\n\nBeta body.";
        let chunks = HeadingChunker::new(2000).chunk(text, &base()).unwrap();
        assert_eq!(
            paths(&chunks),
            vec!["doc_test.s1.p1", "doc_test.s2.p1", "doc_test.s3.p1"]
        );
        assert_eq!(chunks[0].content, "Intro text.");
        // Heading text is folded into its section's first chunk.
        assert!(chunks[1].content.contains("First"));
        assert!(chunks[1].content.contains("Alpha body."));
        let indices: Vec<i64> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_paragraphs_split_at_budget() {
        let text = "aaaa aaaa aaaa.\n\nbbbb bbbb bbbb.\n\ncccc cccc cccc.";
        let chunks = HeadingChunker::new(20).chunk(text, &base()).unwrap();
        assert!(chunks.len() > 1);
        // Sibling pieces of the same section share a parent path.
        for pair in chunks.windows(2) {
            assert!(pair[0].path.is_sibling_of(&pair[1].path));
        }
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let word = "alpha ";
        let text = word.repeat(100); // 600 chars, no blank lines
        let chunks = HeadingChunker::new(50).chunk(&text, &base()).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.len() <= 50);
            assert!(!c.content.is_empty());
        }
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "日本語のテキスト。".repeat(40);
        let chunks = HeadingChunker::new(50).chunk(&text, &base()).unwrap();
        assert!(!chunks.is_empty());
        // Reconstructable without panicking means every split respected
        // char boundaries.
        for c in &chunks {
            assert!(!c.content.is_empty());
        }
    }

    #[test]
    fn test_offsets_cover_content() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = HeadingChunker::new(25).chunk(text, &base()).unwrap();
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            let start = c.start_offset.unwrap() as usize;
            let end = c.end_offset.unwrap() as usize;
            assert_eq!(&text[start..end], c.content);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "# Title\n\nAlpha.\n\nBeta.\n\nGamma.";
        let a = HeadingChunker::new(10).chunk(text, &base()).unwrap();
        let b = HeadingChunker::new(10).chunk(text, &base()).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.content, y.content);
            assert_eq!(x.path, y.path);
            assert_eq!(x.start_offset, y.start_offset);
        }
    }
}
