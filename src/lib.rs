//! slotpress: a markdown content pipeline with slot directives
//!
//! Content files carry front matter and optional `:::slot` / `:::component`
//! directives. Each file is resolved to a registered layout by metadata
//! rules, composed into the layout's slots and handed to the layout's render
//! function. A render cache keyed by content fingerprints skips unchanged
//! sources.

pub mod cache;
pub mod commands;
pub mod compose;
pub mod config;
pub mod content;
pub mod directive;
pub mod error;
mod helpers;
pub mod layout;
pub mod pipeline;
pub mod templates;

pub use cache::RenderCache;
pub use compose::{ComposedNode, Composition};
pub use content::{ContentItem, ContentSet, Identity, Metadata};
pub use error::{Error, ErrorKind};
pub use layout::{LayoutRegistry, Predicate, SlotDeclaration};
pub use pipeline::{Pipeline, PipelineBuilder};

use anyhow::Result;
use std::path::{Path, PathBuf};

use content::MarkdownRenderer;
use templates::Page;

/// A site on disk: `_config.yml` plus a content directory
#[derive(Debug, Clone)]
pub struct Site {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Content directory
    pub content_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
}

impl Site {
    /// Open a site directory; a missing `_config.yml` means defaults
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join("_config.yml");

        let config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            config::SiteConfig::default()
        };

        let content_dir = base_dir.join(&config.content_dir);
        let public_dir = base_dir.join(&config.public_dir);

        Ok(Self {
            config,
            base_dir,
            content_dir,
            public_dir,
        })
    }

    /// Pipeline with the configured rules and the built-in HTML layouts
    pub fn pipeline(&self) -> Result<Pipeline<Page>> {
        let mut registry = LayoutRegistry::new();
        templates::register_layouts(&mut registry, &self.config)?;
        let rules = self.config.resolution_rules()?;
        let markdown = MarkdownRenderer::with_options(
            &self.config.markdown.theme,
            self.config.markdown.line_numbers,
        );

        Ok(Pipeline::builder()
            .registry(registry)
            .rules(rules)
            .layout_key(self.config.layout_key.as_str())
            .fallback_layout(self.config.default_layout.as_str())
            .default_slot(self.config.default_slot.as_str())
            .max_depth(self.config.max_nesting_depth)
            .markdown(markdown)
            .build())
    }

    /// Render every content item into the public directory
    pub fn build(&self) -> Result<commands::build::BuildReport> {
        commands::build::run(self)
    }

    /// Run the pipeline over every content item without writing output
    pub fn check(&self) -> Result<commands::check::CheckReport> {
        commands::check::run(self)
    }

    /// Clean the public directory
    pub fn clean(&self) -> Result<()> {
        commands::clean::run(self)
    }
}
