//! Line scanner for directive fences.
//!
//! The body is scanned once, top to bottom. `pulldown-cmark` decides which
//! lines belong to code blocks or multi-line code spans; fences on those
//! lines are left alone. A fence interrupts an HTML block, and the markdown
//! after each fence is re-examined on its own, the same way it is rendered.
//! Everything between fences is segmented at top-level HTML blocks into text
//! and raw markup nodes.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use pulldown_cmark::{Event, Parser, Tag};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;

use super::attrs::parse_attrs;
use super::{Document, Node, NodeId, NodeKind};
use crate::content::markdown_options;
use crate::error::ErrorKind;

lazy_static! {
    /// Three or more colons after at most three spaces of indentation
    static ref FENCE: Regex = Regex::new(r"^ {0,3}:{3,}[ \t]*(?P<rest>.*?)\s*$")
        .expect("fence pattern is valid");
    static ref OPENER: Regex = Regex::new(
        r"^(?P<name>[A-Za-z0-9_-]+)(?:[ \t]*\{(?P<braced>.*)\}|[ \t]+(?P<bare>.*))?$"
    )
    .expect("opener pattern is valid");
    static ref NAME: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").expect("name pattern is valid");
}

/// Block parsing failures, before they are tied to a content identity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("unterminated `{directive}` block opened at line {line}")]
    Unterminated { directive: String, line: usize },

    #[error("duplicate slot `{name}` at line {line} (first declared at line {first_line})")]
    DuplicateSlot {
        name: String,
        line: usize,
        first_line: usize,
    },

    #[error("directive nesting deeper than {limit} levels at line {line}")]
    NestingTooDeep { line: usize, limit: usize },
}

impl From<BlockError> for ErrorKind {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::Unterminated { directive, line } => {
                ErrorKind::UnterminatedBlock { directive, line }
            }
            BlockError::DuplicateSlot {
                name,
                line,
                first_line,
            } => ErrorKind::DuplicateSlot {
                name,
                line,
                first_line,
            },
            BlockError::NestingTooDeep { line, limit } => ErrorKind::NestingTooDeep { line, limit },
        }
    }
}

/// Whether `name` can be used as a slot or component name
pub fn is_valid_name(name: &str) -> bool {
    NAME.is_match(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Fence {
    OpenSlot(String),
    OpenComponent {
        name: String,
        attrs: IndexMap<String, String>,
    },
    Close,
}

impl Fence {
    fn classify(line: &str) -> Option<Self> {
        let caps = FENCE.captures(line)?;
        let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
        if rest.is_empty() {
            return Some(Fence::Close);
        }

        let opener = OPENER.captures(rest)?;
        let name = &opener["name"];
        let braced = opener.name("braced").map(|m| m.as_str());
        let bare = opener.name("bare").map(|m| m.as_str().trim());

        if name == "slot" {
            return match (braced, bare) {
                (None, Some(slot)) if NAME.is_match(slot) => Some(Fence::OpenSlot(slot.to_string())),
                _ => None,
            };
        }

        let attrs = braced.or(bare).map(parse_attrs).unwrap_or_default();
        Some(Fence::OpenComponent {
            name: name.to_string(),
            attrs,
        })
    }
}

/// An open region waiting for its closing fence
struct Frame {
    kind: NodeKind,
    line: usize,
    children: Vec<NodeId>,
}

impl Frame {
    fn open(fence: Fence, line: usize) -> Option<Self> {
        let kind = match fence {
            Fence::OpenSlot(name) => NodeKind::SlotMarker { name },
            Fence::OpenComponent { name, attrs } => NodeKind::Component { name, attrs },
            Fence::Close => return None,
        };
        Some(Self {
            kind,
            line,
            children: Vec::new(),
        })
    }

    fn directive(&self) -> String {
        match &self.kind {
            NodeKind::SlotMarker { name } => format!("slot {}", name),
            NodeKind::Component { name, .. } => name.clone(),
            NodeKind::TextBlock { .. } | NodeKind::InlineMarkup { .. } => String::new(),
        }
    }

    fn into_node(self) -> Node {
        Node {
            kind: self.kind,
            line: self.line,
            children: self.children,
        }
    }
}

/// Pending run of non-fence lines
#[derive(Default)]
struct TextRun {
    start: Option<(usize, usize)>,
    end: usize,
}

impl TextRun {
    fn push(&mut self, offset: usize, len: usize, line: usize) {
        if self.start.is_none() {
            self.start = Some((offset, line));
        }
        self.end = offset + len;
    }

    fn take(&mut self) -> Option<(Range<usize>, usize)> {
        let (start, line) = self.start.take()?;
        Some((start..self.end, line))
    }
}

struct Builder<'a> {
    body: &'a str,
    doc: Document,
    stack: Vec<Frame>,
    roots: Vec<NodeId>,
    text: TextRun,
}

impl<'a> Builder<'a> {
    fn children(&mut self) -> &mut Vec<NodeId> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.children,
            None => &mut self.roots,
        }
    }

    fn flush_text(&mut self) {
        let Some((range, line)) = self.text.take() else {
            return;
        };
        for node in segment(&self.body[range], line) {
            let id = self.doc.push(node);
            self.children().push(id);
        }
    }
}

/// Parse a markdown body into an annotated document.
///
/// `first_line` is the source line the body starts on, so reported lines
/// refer to the original file. `max_depth` bounds directive nesting.
pub fn parse(body: &str, first_line: usize, max_depth: usize) -> Result<Document, BlockError> {
    let mut protected = protected_ranges(body, 0);
    let mut builder = Builder {
        body,
        doc: Document::default(),
        stack: Vec::new(),
        roots: Vec::new(),
        text: TextRun::default(),
    };
    let mut slot_lines: HashMap<String, usize> = HashMap::new();
    let mut offset = 0;

    for (index, line) in body.split_inclusive('\n').enumerate() {
        let line_no = first_line + index;
        let fence = if is_protected(&protected, offset) {
            None
        } else {
            Fence::classify(line)
        };

        match fence {
            Some(Fence::Close) if !builder.stack.is_empty() => {
                builder.flush_text();
                if let Some(frame) = builder.stack.pop() {
                    let id = builder.doc.push(frame.into_node());
                    builder.children().push(id);
                }
                protected = protected_ranges(body, offset + line.len());
            }
            Some(Fence::Close) => {
                tracing::debug!("Stray closing fence at line {}, kept as text", line_no);
                builder.text.push(offset, line.len(), line_no);
            }
            Some(open) => {
                builder.flush_text();
                if builder.stack.len() >= max_depth {
                    return Err(BlockError::NestingTooDeep {
                        line: line_no,
                        limit: max_depth,
                    });
                }
                if let Fence::OpenSlot(name) = &open {
                    if let Some(&first_line) = slot_lines.get(name) {
                        return Err(BlockError::DuplicateSlot {
                            name: name.clone(),
                            line: line_no,
                            first_line,
                        });
                    }
                    slot_lines.insert(name.clone(), line_no);
                }
                builder.stack.extend(Frame::open(open, line_no));
                protected = protected_ranges(body, offset + line.len());
            }
            None => builder.text.push(offset, line.len(), line_no),
        }

        offset += line.len();
    }

    if let Some(frame) = builder.stack.last() {
        return Err(BlockError::Unterminated {
            directive: frame.directive(),
            line: frame.line,
        });
    }

    builder.flush_text();
    builder.doc.roots = builder.roots;
    Ok(builder.doc)
}

/// Byte ranges of `body[from..]` whose interior lines can never hold a fence
fn protected_ranges(body: &str, from: usize) -> Vec<Range<usize>> {
    Parser::new_ext(&body[from..], markdown_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_)) | Event::Code(_) => {
                Some(range.start + from..range.end + from)
            }
            _ => None,
        })
        .collect()
}

fn is_protected(ranges: &[Range<usize>], line_start: usize) -> bool {
    ranges
        .iter()
        .any(|r| r.start < line_start && line_start < r.end)
}

/// Split a text run at top-level HTML blocks
fn segment(text: &str, first_line: usize) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut cursor = 0;
    let mut depth = 0usize;
    let mut html: Vec<Range<usize>> = Vec::new();

    for (event, range) in Parser::new_ext(text, markdown_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::HtmlBlock) if depth == 0 => {
                html.push(range);
                depth += 1;
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    let line_at = |pos: usize| first_line + text[..pos].matches('\n').count();
    let push_text = |nodes: &mut Vec<Node>, range: Range<usize>| {
        let markdown = &text[range.clone()];
        if markdown.trim().is_empty() {
            return;
        }
        // Report the line of the first non-blank character
        let lead = markdown.len() - markdown.trim_start().len();
        nodes.push(Node {
            kind: NodeKind::TextBlock {
                markdown: markdown.to_string(),
            },
            line: line_at(range.start + lead),
            children: Vec::new(),
        });
    };

    for range in html {
        push_text(&mut nodes, cursor..range.start);
        nodes.push(Node {
            kind: NodeKind::InlineMarkup {
                html: text[range.clone()].to_string(),
            },
            line: line_at(range.start),
            children: Vec::new(),
        });
        cursor = range.end;
    }
    push_text(&mut nodes, cursor..text.len());

    nodes
}
