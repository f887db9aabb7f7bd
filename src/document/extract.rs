//! Text Extractor: document → flat text + position index
//!
//! The flat text must look like the rendered text the detection service is
//! given, otherwise every offset it returns drifts further with each block:
//! - text runs contribute their characters 1:1
//! - a hard break contributes one `'\n'` mapped to the break itself
//! - consecutive textblocks are separated by exactly one `'\n'`, mapped to the
//!   end of the preceding block's content

use crate::document::{Document, Node, PositionMapping};

/// Placeholder emitted for paragraph boundaries and forced breaks
pub const LINE_BREAK: char = '\n';

/// Walk the document and build its flat text and position index.
/// Deterministic: the same snapshot always yields the same mapping.
pub fn extract(doc: &Document) -> PositionMapping {
    let mut walker = Walker::default();
    for node in doc.content() {
        walker.walk(node);
    }
    PositionMapping::from_parts(walker.chars, walker.positions, doc.content_size())
}

/// Flat text only
pub fn extract_text(doc: &Document) -> String {
    extract(doc).flat_text().to_string()
}

#[derive(Default)]
struct Walker {
    chars: Vec<char>,
    positions: Vec<usize>,
    pos: usize,
    /// Content end of the last textblock seen, if any
    last_textblock_end: Option<usize>,
}

impl Walker {
    fn push(&mut self, ch: char, pos: usize) {
        self.chars.push(ch);
        self.positions.push(pos);
    }

    fn walk(&mut self, node: &Node) {
        match node {
            Node::Text(text) => {
                for ch in text.chars() {
                    self.push(ch, self.pos);
                    self.pos += 1;
                }
            }
            Node::HardBreak => {
                self.push(LINE_BREAK, self.pos);
                self.pos += 1;
            }
            Node::Block { content, .. } if node.is_textblock() => {
                self.pos += 1;
                if let Some(prev_end) = self.last_textblock_end {
                    self.push(LINE_BREAK, prev_end);
                }
                for child in content {
                    self.walk(child);
                }
                self.last_textblock_end = Some(self.pos);
                self.pos += 1;
            }
            Node::Block { content, .. } => {
                self.pos += 1;
                for child in content {
                    self.walk(child);
                }
                self.pos += 1;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FlatRange;

    #[test]
    fn test_single_paragraph() {
        let doc = Document::from_plain_text("Contact John Doe");
        let mapping = extract(&doc);
        assert_eq!(mapping.flat_text(), "Contact John Doe");
        assert_eq!(mapping.doc_position(0), Some(1));
        assert_eq!(mapping.doc_position(15), Some(16));
    }

    #[test]
    fn test_paragraph_boundary_is_one_newline() {
        let doc = Document::from_plain_text("Hello\nWorld");
        let mapping = extract(&doc);
        assert_eq!(mapping.flat_text(), "Hello\nWorld");
        assert_eq!(mapping.doc_position(5), Some(6));
        assert_eq!(mapping.doc_position(6), Some(8));
    }

    #[test]
    fn test_empty_paragraph_keeps_line() {
        let doc = Document::from_plain_text("A\n\nB");
        let mapping = extract(&doc);
        assert_eq!(mapping.flat_text(), "A\n\nB");
    }

    #[test]
    fn test_nested_blocks_flatten_in_order() {
        let doc = Document::new(vec![
            Node::paragraph(vec![Node::text("Intro")]),
            Node::block("bullet_list", vec![
                Node::block("list_item", vec![Node::paragraph(vec![Node::text("Anna")])]),
                Node::block("list_item", vec![Node::paragraph(vec![Node::text("Ben")])]),
            ]),
        ]);
        let mapping = extract(&doc);
        assert_eq!(mapping.flat_text(), "Intro\nAnna\nBen");

        let range = mapping.resolve_range(FlatRange::new(11, 14)).unwrap();
        assert_eq!(doc.text_between(range.from, range.to), "Ben");
    }

    #[test]
    fn test_split_text_runs_are_contiguous() {
        let doc = Document::new(vec![Node::paragraph(vec![
            Node::text("Jo"),
            Node::text("hn"),
        ])]);
        let mapping = extract(&doc);
        assert_eq!(mapping.flat_text(), "John");
        let range = mapping.resolve_range(FlatRange::new(0, 4)).unwrap();
        assert_eq!(doc.text_between(range.from, range.to), "John");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let doc = Document::from_plain_text("Mail an jörg@example.de\nDanke");
        assert_eq!(extract(&doc), extract(&doc));
        assert_eq!(extract_text(&doc), "Mail an jörg@example.de\nDanke");
    }

    #[test]
    fn test_empty_document() {
        let mapping = extract(&Document::default());
        assert!(mapping.is_empty());
        assert_eq!(mapping.content_size(), 0);
    }
}
