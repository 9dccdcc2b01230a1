//! The content pipeline: front matter, block directives, layout resolution
//! and composition, run in sequence for one content item

use crate::compose::{Composer, Composition};
use crate::content::{ContentItem, MarkdownRenderer, ParsedContent};
use crate::directive::DEFAULT_MAX_DEPTH;
use crate::error::Result;
use crate::layout::{
    LayoutRegistry, Predicate, RegistryError, Resolution, ResolutionRule, Resolver,
    SlotDeclaration,
};

/// Layout used when neither metadata nor a rule selects one
pub const DEFAULT_LAYOUT: &str = "default";
/// Metadata key naming a layout explicitly
pub const DEFAULT_LAYOUT_KEY: &str = "layout";
/// Slot that receives content outside any slot marker
pub const DEFAULT_SLOT: &str = "main";

/// Immutable pipeline configuration. Build one with [`Pipeline::builder`]
/// and share it behind an `Arc` across workers.
#[derive(Debug)]
pub struct Pipeline<P> {
    resolver: Resolver<P>,
    renderer: MarkdownRenderer,
    max_depth: usize,
}

impl<P> Pipeline<P> {
    pub fn builder() -> PipelineBuilder<P> {
        PipelineBuilder::new()
    }

    pub fn resolver(&self) -> &Resolver<P> {
        &self.resolver
    }

    pub fn registry(&self) -> &LayoutRegistry<P> {
        self.resolver.registry()
    }

    pub fn renderer(&self) -> &MarkdownRenderer {
        &self.renderer
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Front matter and block directives
    pub fn parse(&self, item: &ContentItem) -> Result<ParsedContent> {
        item.parse(self.max_depth)
    }

    pub fn resolve<'a>(&'a self, parsed: &ParsedContent) -> Result<Resolution<'a, P>> {
        self.resolver
            .resolve(&parsed.identity, &parsed.metadata, &parsed.document)
    }

    pub fn compose<'a>(
        &self,
        parsed: &'a ParsedContent,
        resolution: &Resolution<'a, P>,
    ) -> Result<Composition<'a>> {
        Composer::new(&self.renderer).compose(parsed, resolution)
    }

    /// Run every stage and hand the composition to the layout
    pub fn render(&self, item: &ContentItem) -> Result<P> {
        let parsed = self.parse(item)?;
        let resolution = self.resolve(&parsed)?;
        let composition = self.compose(&parsed, &resolution)?;
        Ok(resolution.layout.render(&composition))
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder<P> {
    registry: LayoutRegistry<P>,
    rules: Vec<ResolutionRule>,
    layout_key: String,
    fallback: String,
    default_slot: String,
    max_depth: usize,
    renderer: Option<MarkdownRenderer>,
}

impl<P> PipelineBuilder<P> {
    pub fn new() -> Self {
        Self {
            registry: LayoutRegistry::new(),
            rules: Vec::new(),
            layout_key: DEFAULT_LAYOUT_KEY.to_string(),
            fallback: DEFAULT_LAYOUT.to_string(),
            default_slot: DEFAULT_SLOT.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            renderer: None,
        }
    }

    /// Register a layout
    pub fn layout<F>(
        mut self,
        id: impl Into<String>,
        slots: Vec<SlotDeclaration>,
        render: F,
    ) -> Result<Self, RegistryError>
    where
        F: Fn(&Composition<'_>) -> P + Send + Sync + 'static,
    {
        self.registry.register(id, slots, render)?;
        Ok(self)
    }

    /// Use an already populated registry, replacing any layouts added so far
    pub fn registry(mut self, registry: LayoutRegistry<P>) -> Self {
        self.registry = registry;
        self
    }

    /// Append a rule; rules are tried in the order they were added
    pub fn rule(mut self, predicate: Predicate, layout: impl Into<String>) -> Self {
        self.rules.push(ResolutionRule::new(predicate, layout));
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = ResolutionRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn layout_key(mut self, key: impl Into<String>) -> Self {
        self.layout_key = key.into();
        self
    }

    pub fn fallback_layout(mut self, layout: impl Into<String>) -> Self {
        self.fallback = layout.into();
        self
    }

    pub fn default_slot(mut self, slot: impl Into<String>) -> Self {
        self.default_slot = slot.into();
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn markdown(mut self, renderer: MarkdownRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Pipeline<P> {
        if !self.registry.contains(&self.fallback) {
            tracing::warn!("Fallback layout {} is not registered", self.fallback);
        }
        for rule in &self.rules {
            if !self.registry.contains(&rule.layout) {
                tracing::warn!("Rule {:?} targets unregistered layout {}", rule.predicate, rule.layout);
            }
        }

        Pipeline {
            resolver: Resolver::new(
                self.registry,
                self.rules,
                self.layout_key,
                self.fallback,
                self.default_slot,
            ),
            renderer: self.renderer.unwrap_or_default(),
            max_depth: self.max_depth,
        }
    }
}

impl<P> Default for PipelineBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}
