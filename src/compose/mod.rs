//! Composition - turns an annotated document and its slot bindings into the
//! structure handed to a layout's render function

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::content::{
    page_slug, page_title, HeadingIds, Identity, MarkdownRenderer, Metadata, ParsedContent,
};
use crate::directive::{Document, NodeId, NodeKind};
use crate::error::{Error, ErrorKind, Result};
use crate::helpers::html_escape;
use crate::layout::{Resolution, SlotBinding};

/// A composed document node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposedNode {
    /// Rendered markdown or verbatim markup
    Html(String),
    Component {
        name: String,
        attrs: IndexMap<String, String>,
        children: Vec<ComposedNode>,
    },
    /// A slot marker replaced by the content bound to it. The subtree is
    /// shared with the composition's slot map.
    Slot {
        name: String,
        children: Arc<[ComposedNode]>,
    },
}

/// Everything a layout's render function receives
#[derive(Debug)]
pub struct Composition<'a> {
    pub identity: &'a Identity,
    pub layout: &'a str,
    pub metadata: &'a Metadata,
    /// The whole composed document, slot regions included in place
    pub body: Arc<[ComposedNode]>,
    /// Bound slots; declared slots first in declaration order, then any
    /// other slot markers in document order
    pub slots: IndexMap<String, Arc<[ComposedNode]>>,
}

impl Composition<'_> {
    /// Slug from metadata, or the file stem
    pub fn slug(&self) -> String {
        page_slug(self.identity, self.metadata)
    }

    /// Title from metadata, or the slug in title case
    pub fn title(&self) -> String {
        page_title(self.identity, self.metadata)
    }

    pub fn slot(&self, name: &str) -> Option<&[ComposedNode]> {
        self.slots.get(name).map(|nodes| &nodes[..])
    }

    /// HTML of a slot, empty when it is unbound
    pub fn slot_html(&self, name: &str) -> String {
        self.slot(name).map(to_html).unwrap_or_default()
    }

    /// Whether a slot is bound to content that renders to non-blank HTML
    pub fn is_filled(&self, name: &str) -> bool {
        !self.slot_html(name).trim().is_empty()
    }

    /// Evaluate a visibility condition such as `"toc"`, `"!sidebar"` or
    /// `"toc, !sidebar"`. Terms are ORed; `!name` holds when the slot is not
    /// filled. A blank condition always holds.
    pub fn is_visible(&self, condition: &str) -> bool {
        let mut terms = condition.split(',').map(str::trim).filter(|t| !t.is_empty()).peekable();
        if terms.peek().is_none() {
            return true;
        }
        terms.any(|term| match term.strip_prefix('!') {
            Some(name) => !self.is_filled(name.trim()),
            None => self.is_filled(term),
        })
    }

    pub fn body_html(&self) -> String {
        to_html(&self.body)
    }
}

/// Serialize composed nodes to HTML. Components become `<div>` elements
/// carrying their name and attributes as data attributes.
pub fn to_html(nodes: &[ComposedNode]) -> String {
    let mut out = String::new();
    write_html(&mut out, nodes);
    out
}

fn write_html(out: &mut String, nodes: &[ComposedNode]) {
    for node in nodes {
        match node {
            ComposedNode::Html(html) => out.push_str(html),
            ComposedNode::Component {
                name,
                attrs,
                children,
            } => {
                out.push_str(&format!(r#"<div class="component" data-component="{}""#, name));
                for (key, value) in attrs {
                    out.push_str(&format!(
                        r#" data-{}="{}""#,
                        html_escape(key),
                        html_escape(value)
                    ));
                }
                out.push('>');
                write_html(out, children);
                out.push_str("</div>");
            }
            ComposedNode::Slot { name, children } => {
                out.push_str(&format!(r#"<div class="slot" data-slot="{}">"#, name));
                write_html(out, children);
                out.push_str("</div>");
            }
        }
    }
}

/// Slots bound so far in one composition
#[derive(Default)]
struct SlotTable {
    slots: IndexMap<String, Arc<[ComposedNode]>>,
    /// Content line of each binding; `None` for bindings from layout defaults
    lines: HashMap<String, Option<usize>>,
}

impl SlotTable {
    fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    fn bind(
        &mut self,
        name: &str,
        nodes: Arc<[ComposedNode]>,
        line: Option<usize>,
    ) -> std::result::Result<(), ErrorKind> {
        if let Some(&first) = self.lines.get(name) {
            return Err(ErrorKind::DuplicateSlotBinding {
                slot: name.to_string(),
                line: first.or(line),
            });
        }
        self.slots.insert(name.to_string(), nodes);
        self.lines.insert(name.to_string(), line);
        Ok(())
    }
}

/// Per-composition state threaded through the document walk
#[derive(Default)]
struct State {
    table: SlotTable,
    headings: HeadingIds,
}

/// Walks annotated documents, rendering text blocks through the markdown
/// renderer
pub struct Composer<'m> {
    renderer: &'m MarkdownRenderer,
}

impl<'m> Composer<'m> {
    pub fn new(renderer: &'m MarkdownRenderer) -> Self {
        Self { renderer }
    }

    /// Compose a parsed item into the layout it resolved to
    pub fn compose<'a, P>(
        &self,
        parsed: &'a ParsedContent,
        resolution: &Resolution<'a, P>,
    ) -> Result<Composition<'a>> {
        let document = &parsed.document;
        let fail = |kind: ErrorKind| Error::new(&parsed.identity, kind);

        let mut state = State::default();
        let body: Arc<[ComposedNode]> = self
            .nodes(document, document.roots(), &mut state, true)
            .map_err(fail)?
            .into();

        // Markers inside defaults fill their slots before any fallback is
        // applied, so declaration order does not matter
        let mut defaults = HashMap::new();
        for (&name, binding) in &resolution.bindings {
            if let SlotBinding::Default(default) = binding {
                let nodes: Arc<[ComposedNode]> = self
                    .nodes(default, default.roots(), &mut state, false)
                    .map_err(fail)?
                    .into();
                defaults.insert(name, nodes);
            }
        }

        let State { mut table, .. } = state;
        for (&name, binding) in &resolution.bindings {
            match binding {
                SlotBinding::Content(_) => {}
                SlotBinding::Loose => {
                    let line = document.loose_roots().next().map(|id| document.node(id).line);
                    table.bind(name, loose_nodes(&body), line).map_err(fail)?;
                }
                SlotBinding::Default(_) | SlotBinding::Empty if table.contains(name) => {
                    tracing::debug!(
                        "{}: slot `{}` filled by a marker in another default",
                        parsed.identity,
                        name
                    );
                }
                SlotBinding::Default(_) => {
                    let nodes = defaults.remove(name).unwrap_or_else(|| Arc::from(Vec::new()));
                    table.bind(name, nodes, None).map_err(fail)?;
                }
                SlotBinding::Empty => {
                    table.bind(name, Arc::from(Vec::new()), None).map_err(fail)?;
                }
            }
        }

        let mut slots = IndexMap::with_capacity(table.slots.len());
        for &name in resolution.bindings.keys() {
            if let Some(nodes) = table.slots.shift_remove(name) {
                slots.insert(name.to_string(), nodes);
            }
        }
        slots.extend(table.slots);

        tracing::debug!(
            "{}: composed {} top-level nodes into {} slots",
            parsed.identity,
            body.len(),
            slots.len()
        );

        Ok(Composition {
            identity: &parsed.identity,
            layout: resolution.layout.id(),
            metadata: &parsed.metadata,
            body,
            slots,
        })
    }

    /// `from_item` is false for layout defaults, whose lines are not lines
    /// of the content file
    fn nodes(
        &self,
        document: &Document,
        ids: &[NodeId],
        state: &mut State,
        from_item: bool,
    ) -> std::result::Result<Vec<ComposedNode>, ErrorKind> {
        let mut composed = Vec::with_capacity(ids.len());
        for &id in ids {
            let node = document.node(id);
            let next = match &node.kind {
                NodeKind::TextBlock { markdown } => {
                    ComposedNode::Html(self.renderer.render_with_ids(markdown, &mut state.headings))
                }
                NodeKind::InlineMarkup { html } => ComposedNode::Html(html.clone()),
                NodeKind::Component { name, attrs } => ComposedNode::Component {
                    name: name.clone(),
                    attrs: attrs.clone(),
                    children: self.nodes(document, &node.children, state, from_item)?,
                },
                NodeKind::SlotMarker { name } => {
                    let children: Arc<[ComposedNode]> =
                        self.nodes(document, &node.children, state, from_item)?.into();
                    let line = from_item.then_some(node.line);
                    state.table.bind(name, Arc::clone(&children), line)?;
                    ComposedNode::Slot {
                        name: name.clone(),
                        children,
                    }
                }
            };
            composed.push(next);
        }
        Ok(composed)
    }
}

/// Top-level nodes outside slot markers
fn loose_nodes(body: &Arc<[ComposedNode]>) -> Arc<[ComposedNode]> {
    if body.iter().all(|n| !matches!(n, ComposedNode::Slot { .. })) {
        return Arc::clone(body);
    }
    body.iter()
        .filter(|n| !matches!(n, ComposedNode::Slot { .. }))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentItem;
    use crate::layout::{LayoutRegistry, Resolver, SlotDeclaration};
    use pretty_assertions::assert_eq;
    use std::time::SystemTime;

    fn resolver(slots: Vec<SlotDeclaration>) -> Resolver<()> {
        let mut registry = LayoutRegistry::new();
        registry.register("page", slots, |_: &Composition<'_>| ()).unwrap();
        Resolver::new(registry, vec![], "layout", "page", "main")
    }

    fn parsed(raw: &str) -> ParsedContent {
        ContentItem::new("a.md", raw, SystemTime::UNIX_EPOCH)
            .parse(16)
            .unwrap()
    }

    fn compose_with<T>(
        slots: Vec<SlotDeclaration>,
        raw: &str,
        check: impl FnOnce(Result<Composition<'_>>) -> T,
    ) -> T {
        let renderer = MarkdownRenderer::new();
        let resolver = resolver(slots);
        let parsed = parsed(raw);
        let resolution = resolver
            .resolve(&parsed.identity, &parsed.metadata, &parsed.document)
            .unwrap();
        check(Composer::new(&renderer).compose(&parsed, &resolution))
    }

    #[test]
    fn test_slot_replaced_in_place_and_shared() {
        compose_with(
            vec![SlotDeclaration::required("main"), SlotDeclaration::required("aside")],
            "Intro\n\n:::slot aside\n**Note**\n:::\n",
            |composition| {
                let composition = composition.unwrap();
                assert_eq!(composition.body.len(), 2);
                assert_eq!(composition.body[0], ComposedNode::Html("<p>Intro</p>\n".to_string()));
                let ComposedNode::Slot { name, children } = &composition.body[1] else {
                    panic!("expected a slot node");
                };
                assert_eq!(name, "aside");
                assert!(Arc::ptr_eq(children, &composition.slots["aside"]));
                assert_eq!(
                    composition.slot_html("aside"),
                    "<p><strong>Note</strong></p>\n"
                );
                assert_eq!(composition.slot_html("main"), "<p>Intro</p>\n");
            },
        );
    }

    #[test]
    fn test_loose_content_shares_body() {
        compose_with(vec![SlotDeclaration::required("main")], "Hello", |composition| {
            let composition = composition.unwrap();
            assert!(Arc::ptr_eq(&composition.body, &composition.slots["main"]));
        });
    }

    #[test]
    fn test_components_and_inline_markup() {
        compose_with(
            vec![SlotDeclaration::optional("main")],
            ":::card {tone=info}\n<div>raw</div>\n\ntext\n:::\n",
            |composition| {
                let composition = composition.unwrap();
                let ComposedNode::Component { name, attrs, children } = &composition.body[0] else {
                    panic!("expected a component node");
                };
                assert_eq!(name, "card");
                assert_eq!(attrs["tone"], "info");
                assert!(matches!(&children[0], ComposedNode::Html(h) if h.starts_with("<div>raw</div>")));
                let html = composition.body_html();
                assert!(html.starts_with(
                    r#"<div class="component" data-component="card" data-tone="info"><div>raw</div>"#
                ));
                assert!(html.ends_with("<p>text</p>\n</div>"));
            },
        );
    }

    #[test]
    fn test_default_and_empty_slots() {
        compose_with(
            vec![
                SlotDeclaration::required("main"),
                SlotDeclaration::optional("aside").with_default("*none*"),
                SlotDeclaration::optional("footer"),
            ],
            "Body",
            |composition| {
                let composition = composition.unwrap();
                assert_eq!(composition.slot_html("aside"), "<p><em>none</em></p>\n");
                assert_eq!(composition.slot("footer"), Some(&[][..]));
                let order: Vec<_> = composition.slots.keys().map(String::as_str).collect();
                assert_eq!(order, vec!["main", "aside", "footer"]);
            },
        );
    }

    #[test]
    fn test_default_redeclaring_bound_slot() {
        compose_with(
            vec![
                SlotDeclaration::required("title"),
                SlotDeclaration::optional("aside").with_default(":::slot title\nagain\n:::\n"),
            ],
            ":::slot title\nT\n:::\n",
            |composition| {
                let err = composition.unwrap_err();
                assert!(matches!(
                    err.kind,
                    ErrorKind::DuplicateSlotBinding { ref slot, line: Some(1) } if slot == "title"
                ));
            },
        );
    }

    #[test]
    fn test_default_fills_empty_optional_slot() {
        let slots = || {
            vec![
                SlotDeclaration::required("main"),
                SlotDeclaration::optional("aside").with_default("Aside\n\n:::slot note\nN\n:::\n"),
                SlotDeclaration::optional("note"),
            ]
        };
        compose_with(slots(), "Body", |composition| {
            let composition = composition.unwrap();
            assert_eq!(composition.slot_html("note"), "<p>N</p>\n");
            assert!(composition.slot_html("aside").starts_with("<p>Aside</p>\n"));
            let order: Vec<_> = composition.slots.keys().map(String::as_str).collect();
            assert_eq!(order, vec!["main", "aside", "note"]);
        });

        // Same outcome when the filled slot is declared first
        let mut reordered = slots();
        reordered.swap(1, 2);
        compose_with(reordered, "Body", |composition| {
            assert_eq!(composition.unwrap().slot_html("note"), "<p>N</p>\n");
        });
    }

    #[test]
    fn test_two_defaults_declaring_one_slot() {
        compose_with(
            vec![
                SlotDeclaration::optional("main"),
                SlotDeclaration::optional("a").with_default(":::slot note\nA\n:::\n"),
                SlotDeclaration::optional("b").with_default(":::slot note\nB\n:::\n"),
            ],
            "Body",
            |composition| {
                let err = composition.unwrap_err();
                assert!(matches!(
                    err.kind,
                    ErrorKind::DuplicateSlotBinding { ref slot, line: None } if slot == "note"
                ));
                assert_eq!(err.line(), None);
            },
        );
    }

    #[test]
    fn test_filled_slots_and_visibility() {
        compose_with(
            vec![
                SlotDeclaration::required("main"),
                SlotDeclaration::optional("toc"),
                SlotDeclaration::optional("sidebar"),
            ],
            "Body\n\n:::slot toc\n- a\n:::\n",
            |composition| {
                let composition = composition.unwrap();
                assert!(composition.is_filled("main"));
                assert!(composition.is_filled("toc"));
                assert!(!composition.is_filled("sidebar"));
                assert!(!composition.is_filled("missing"));

                assert!(composition.is_visible("toc"));
                assert!(composition.is_visible("!sidebar"));
                assert!(!composition.is_visible("sidebar"));
                assert!(!composition.is_visible("!toc"));
                assert!(composition.is_visible("sidebar, toc"));
                assert!(composition.is_visible(" "));
            },
        );
    }

    #[test]
    fn test_heading_ids_unique_across_slots() {
        compose_with(
            vec![SlotDeclaration::required("main"), SlotDeclaration::required("aside")],
            "## Notes\n\n:::slot aside\n## Notes\n:::\n",
            |composition| {
                let composition = composition.unwrap();
                assert_eq!(composition.slot_html("main"), "<h2 id=\"notes\">Notes</h2>\n");
                assert_eq!(composition.slot_html("aside"), "<h2 id=\"notes-1\">Notes</h2>\n");
            },
        );
    }

    #[test]
    fn test_nested_slots_bound_independently() {
        compose_with(
            vec![SlotDeclaration::required("outer"), SlotDeclaration::required("inner")],
            ":::slot outer\nA\n\n:::slot inner\nB\n:::\n:::\n",
            |composition| {
                let composition = composition.unwrap();
                assert_eq!(composition.slot_html("inner"), "<p>B</p>\n");
                assert_eq!(
                    composition.slot_html("outer"),
                    "<p>A</p>\n<div class=\"slot\" data-slot=\"inner\"><p>B</p>\n</div>"
                );
            },
        );
    }
}
