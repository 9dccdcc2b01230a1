//! Layouts - registered render functions and the slots they accept

pub mod resolver;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::compose::Composition;
use crate::directive::{self, Document};

pub use resolver::{LayoutSource, Predicate, Resolution, ResolutionRule, Resolver, SlotBinding};

/// Host render function turning a composition into a page value
pub type RenderFn<P> = Arc<dyn Fn(&Composition<'_>) -> P + Send + Sync>;

/// Layout setup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("layout `{layout}` is already registered")]
    DuplicateLayout { layout: String },

    #[error("layout `{layout}` declares slot `{slot}` more than once")]
    DuplicateSlot { layout: String, slot: String },

    #[error("layout `{layout}` declares invalid slot name `{slot}`")]
    InvalidSlotName { layout: String, slot: String },

    #[error("default content of slot `{slot}` in layout `{layout}`: {message}")]
    InvalidDefault {
        layout: String,
        slot: String,
        message: String,
    },
}

/// A slot a layout accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDeclaration {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
    /// Markdown used when content does not bind the slot
    #[serde(default)]
    pub default: Option<String>,
}

impl SlotDeclaration {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(name)
        }
    }

    pub fn with_default(mut self, markdown: impl Into<String>) -> Self {
        self.default = Some(markdown.into());
        self
    }
}

/// A registered layout
pub struct LayoutDescriptor<P> {
    id: String,
    slots: Vec<SlotDeclaration>,
    defaults: IndexMap<String, Document>,
    render: RenderFn<P>,
}

impl<P> LayoutDescriptor<P> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declared slots, in declaration order
    pub fn slots(&self) -> &[SlotDeclaration] {
        &self.slots
    }

    /// Parsed default content of a declared slot
    pub fn default_content(&self, slot: &str) -> Option<&Document> {
        self.defaults.get(slot)
    }

    pub fn render(&self, composition: &Composition<'_>) -> P {
        (self.render)(composition)
    }
}

impl<P> fmt::Debug for LayoutDescriptor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutDescriptor")
            .field("id", &self.id)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// Layouts by identifier
pub struct LayoutRegistry<P> {
    layouts: IndexMap<String, LayoutDescriptor<P>>,
}

impl<P> LayoutRegistry<P> {
    pub fn new() -> Self {
        Self {
            layouts: IndexMap::new(),
        }
    }

    /// Register a layout. Default slot content is parsed here so broken
    /// defaults fail at setup rather than on the first render.
    pub fn register<F>(
        &mut self,
        id: impl Into<String>,
        slots: Vec<SlotDeclaration>,
        render: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Composition<'_>) -> P + Send + Sync + 'static,
    {
        self.register_shared(id, slots, Arc::new(render))
    }

    /// Register a layout with an already shared render function
    pub fn register_shared(
        &mut self,
        id: impl Into<String>,
        slots: Vec<SlotDeclaration>,
        render: RenderFn<P>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if self.layouts.contains_key(&id) {
            return Err(RegistryError::DuplicateLayout { layout: id });
        }

        let mut defaults = IndexMap::new();
        for (i, slot) in slots.iter().enumerate() {
            if !directive::is_valid_name(&slot.name) {
                return Err(RegistryError::InvalidSlotName {
                    layout: id,
                    slot: slot.name.clone(),
                });
            }
            if slots[..i].iter().any(|s| s.name == slot.name) {
                return Err(RegistryError::DuplicateSlot {
                    layout: id,
                    slot: slot.name.clone(),
                });
            }
            if let Some(markdown) = &slot.default {
                let document = directive::parse(markdown, 1, directive::DEFAULT_MAX_DEPTH)
                    .map_err(|e| RegistryError::InvalidDefault {
                        layout: id.clone(),
                        slot: slot.name.clone(),
                        message: e.to_string(),
                    })?;
                defaults.insert(slot.name.clone(), document);
            }
        }

        tracing::debug!("Registered layout {} with {} slots", id, slots.len());
        self.layouts.insert(
            id.clone(),
            LayoutDescriptor {
                id,
                slots,
                defaults,
                render,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&LayoutDescriptor<P>> {
        self.layouts.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.layouts.contains_key(id)
    }

    /// Layout identifiers in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.layouts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl<P> Default for LayoutRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for LayoutRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.layouts.values()).finish()
    }
}
