//! Block extension directives: slot markers and nested component regions.
//!
//! Directives use colon fences on their own lines:
//!
//! ```text
//! :::slot sidebar
//! Anything here is bound to the `sidebar` slot.
//!
//! :::card {tone=info title="Heads up"}
//! Nested regions are parsed as markdown plus directives.
//! :::
//! :::
//! ```
//!
//! Parsed documents are stored as an arena: every node lives in one `Vec`
//! and refers to its children by [`NodeId`].

mod attrs;
mod parser;

use indexmap::IndexMap;
use serde::Serialize;

pub use parser::{is_valid_name, parse, BlockError};

/// Nesting limit used when none is configured
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Index of a node inside its [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a document node represents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Plain markdown source
    TextBlock { markdown: String },
    /// Raw HTML block, passed through verbatim
    InlineMarkup { html: String },
    /// Named slot; children are the content bound to it
    SlotMarker { name: String },
    /// Nested component region
    Component {
        name: String,
        attrs: IndexMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    /// 1-based source line where the node starts
    pub line: usize,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn slot_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::SlotMarker { name } => Some(name),
            _ => None,
        }
    }
}

/// Annotated document tree for one piece of markdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Document {
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Slot markers at any depth, in document order
    pub fn slots(&self) -> IndexMap<&str, NodeId> {
        let mut slots = IndexMap::new();
        self.walk(&self.roots, &mut |id, node| {
            if let Some(name) = node.slot_name() {
                slots.entry(name).or_insert(id);
            }
        });
        slots
    }

    /// Top-level nodes that are not slot markers
    pub fn loose_roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots
            .iter()
            .copied()
            .filter(|id| self.node(*id).slot_name().is_none())
    }

    pub fn has_loose_content(&self) -> bool {
        self.loose_roots().next().is_some()
    }

    /// Pre-order traversal starting at `ids`
    pub fn walk<'a>(&'a self, ids: &[NodeId], visit: &mut impl FnMut(NodeId, &'a Node)) {
        for &id in ids {
            let node = self.node(id);
            visit(id, node);
            self.walk(&node.children, visit);
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_in_document_order() {
        let doc = parse(
            ":::slot outer\n:::slot inner\nx\n:::\n:::\n\n:::slot after\n:::\n",
            1,
            16,
        )
        .unwrap();
        let names: Vec<_> = doc.slots().keys().copied().collect();
        assert_eq!(names, vec!["outer", "inner", "after"]);
    }

    #[test]
    fn test_loose_roots() {
        let doc = parse("intro\n\n:::slot title\nT\n:::\noutro\n", 1, 16).unwrap();
        assert!(doc.has_loose_content());
        assert_eq!(doc.loose_roots().count(), 2);

        let doc = parse(":::slot title\nT\n:::\n", 1, 16).unwrap();
        assert!(!doc.has_loose_content());
    }
}
