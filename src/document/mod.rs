//! Structured document model
//!
//! A minimal mirror of the host editor's tree: a root holding blocks, blocks
//! holding either more blocks or inline content (text runs and forced line
//! breaks). Positions follow the host convention:
//! - the root's content starts at position 0
//! - entering and leaving a block costs one position each
//! - every text character and every hard break costs one position
//!
//! Characters are Unicode scalar values throughout the crate.

pub mod edit;
pub mod extract;
pub mod mapping;

pub use edit::*;
pub use extract::*;
pub use mapping::*;

use serde::Deserialize;

// =============================================================================
// Node
// =============================================================================

/// A node of the structured document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Paragraph, heading, list item, blockquote, ...
    Block { kind: String, content: Vec<Node> },
    /// Atomic inline text run
    Text(String),
    /// Forced line break inside a block
    HardBreak,
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn paragraph(content: Vec<Node>) -> Self {
        Node::Block { kind: "paragraph".to_string(), content }
    }

    pub fn block(kind: impl Into<String>, content: Vec<Node>) -> Self {
        Node::Block { kind: kind.into(), content }
    }

    /// Number of positions this node occupies in the host document
    pub fn size(&self) -> usize {
        match self {
            Node::Text(text) => text.chars().count(),
            Node::HardBreak => 1,
            Node::Block { content, .. } => 2 + content.iter().map(Node::size).sum::<usize>(),
        }
    }

    /// A block whose children are inline (or that has no children at all)
    pub fn is_textblock(&self) -> bool {
        match self {
            Node::Block { content, .. } => content
                .iter()
                .all(|child| matches!(child, Node::Text(_) | Node::HardBreak)),
            _ => false,
        }
    }
}

// =============================================================================
// Host JSON ingestion
// =============================================================================

/// Host editor JSON shape: `{ "type": "paragraph", "content": [...], "text": "..." }`
#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<RawNode>,
    #[serde(default)]
    text: Option<String>,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        match raw.kind.as_str() {
            "text" => Node::Text(raw.text.unwrap_or_default()),
            "hard_break" | "hardBreak" => Node::HardBreak,
            _ => Node::Block {
                kind: raw.kind,
                content: raw.content.into_iter().map(Node::from).collect(),
            },
        }
    }
}

// =============================================================================
// Document
// =============================================================================

/// Root of the structured document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct Document {
    content: Vec<Node>,
}

impl TryFrom<RawNode> for Document {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        match raw.kind.as_str() {
            "doc" => Ok(Self::new(raw.content.into_iter().map(Node::from).collect())),
            "text" | "hard_break" | "hardBreak" => {
                Err(format!("Document root cannot be an inline '{}' node", raw.kind))
            }
            // A bare block is accepted as a single-block document
            _ => Ok(Self::new(vec![Node::from(raw)])),
        }
    }
}

impl Document {
    pub fn new(content: Vec<Node>) -> Self {
        Self { content }
    }

    /// One paragraph per line, no hard breaks
    pub fn from_plain_text(text: &str) -> Self {
        let content = text
            .split('\n')
            .map(|line| {
                if line.is_empty() {
                    Node::paragraph(vec![])
                } else {
                    Node::paragraph(vec![Node::text(line)])
                }
            })
            .collect();
        Self::new(content)
    }

    /// Parse the host editor's JSON representation
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse document: {}", e))
    }

    pub fn content(&self) -> &[Node] {
        &self.content
    }

    /// Size of the root's content; valid positions are `0..=content_size`
    pub fn content_size(&self) -> usize {
        self.content.iter().map(Node::size).sum()
    }

    /// Concatenated text of all text runs whose characters sit in `from..to`
    pub fn text_between(&self, from: usize, to: usize) -> String {
        let mut out = String::new();
        let mut pos = 0;
        for node in &self.content {
            collect_text(node, &mut pos, from, to, &mut out);
        }
        out
    }
}

fn collect_text(node: &Node, pos: &mut usize, from: usize, to: usize, out: &mut String) {
    match node {
        Node::Text(text) => {
            for ch in text.chars() {
                if *pos >= from && *pos < to {
                    out.push(ch);
                }
                *pos += 1;
            }
        }
        Node::HardBreak => *pos += 1,
        Node::Block { content, .. } => {
            *pos += 1;
            for child in content {
                collect_text(child, pos, from, to, out);
            }
            *pos += 1;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_sizes() {
        assert_eq!(Node::text("Hello").size(), 5);
        assert_eq!(Node::HardBreak.size(), 1);
        assert_eq!(Node::paragraph(vec![Node::text("Hi")]).size(), 4);
        assert_eq!(Node::paragraph(vec![]).size(), 2);
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        assert_eq!(Node::text("Jörg").size(), 4);
    }

    #[test]
    fn test_content_size() {
        let doc = Document::from_plain_text("Hello\nWorld");
        assert_eq!(doc.content_size(), 14);
    }

    #[test]
    fn test_text_between() {
        let doc = Document::from_plain_text("Hello\nWorld");
        assert_eq!(doc.text_between(1, 6), "Hello");
        assert_eq!(doc.text_between(8, 13), "World");
        assert_eq!(doc.text_between(0, 14), "HelloWorld");
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "type": "doc",
            "content": [
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "Hello" },
                    { "type": "hard_break" },
                    { "type": "text", "text": "World" }
                ]}
            ]
        }"#;
        let doc = Document::from_json(json).unwrap();
        assert_eq!(doc.content().len(), 1);
        assert_eq!(doc.content_size(), 13);
        assert!(doc.content()[0].is_textblock());
    }

    #[test]
    fn test_from_json_rejects_inline_root() {
        let err = Document::from_json(r#"{ "type": "text", "text": "x" }"#).unwrap_err();
        assert!(err.contains("inline"));
    }

    #[test]
    fn test_nested_blocks_are_not_textblocks() {
        let list = Node::block("bullet_list", vec![
            Node::block("list_item", vec![Node::paragraph(vec![Node::text("a")])]),
        ]);
        assert!(!list.is_textblock());
    }
}
