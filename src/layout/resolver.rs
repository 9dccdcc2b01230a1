//! Layout resolution - picks a layout for a content item and binds its slots

use glob::{MatchOptions, Pattern};
use indexmap::IndexMap;
use regex::Regex;
use serde_yaml::Value;
use std::fmt;
use std::sync::Arc;

use super::{LayoutDescriptor, LayoutRegistry};
use crate::content::{Identity, Metadata};
use crate::directive::{Document, NodeId};
use crate::error::{Error, ErrorKind, Result};

/// Host predicate over a content item
pub type PredicateFn = Arc<dyn Fn(&Identity, &Metadata) -> bool + Send + Sync>;

/// Condition of a resolution rule
#[derive(Clone)]
pub enum Predicate {
    /// Metadata value equals `value`; list values match by membership
    MetaEquals { key: String, value: String },
    /// Metadata key is present
    MetaExists(String),
    /// Metadata string value (or any list element) matches the pattern
    MetaMatches { key: String, pattern: Regex },
    /// Identity matches a glob such as `posts/**/*.md`
    PathGlob(Pattern),
    /// Identity lives in this directory or below it
    InDirectory(String),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Custom(PredicateFn),
}

impl Predicate {
    pub fn meta_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MetaEquals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn meta_exists(key: impl Into<String>) -> Self {
        Self::MetaExists(key.into())
    }

    pub fn meta_matches(key: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::MetaMatches {
            key: key.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn path_glob(pattern: &str) -> Result<Self, glob::PatternError> {
        Ok(Self::PathGlob(Pattern::new(pattern)?))
    }

    pub fn in_directory(dir: impl Into<String>) -> Self {
        Self::InDirectory(dir.into().trim_matches('/').to_string())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Identity, &Metadata) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Evaluate the predicate for one content item
    pub fn matches(&self, identity: &Identity, metadata: &Metadata) -> bool {
        match self {
            Self::MetaEquals { key, value } => metadata
                .get(key)
                .map(|v| value_equals(v, value))
                .unwrap_or(false),
            Self::MetaExists(key) => metadata.contains_key(key),
            Self::MetaMatches { key, pattern } => metadata
                .get(key)
                .map(|v| value_matches(v, pattern))
                .unwrap_or(false),
            Self::PathGlob(pattern) => pattern.matches_with(
                identity.as_str(),
                MatchOptions {
                    case_sensitive: true,
                    require_literal_separator: true,
                    require_literal_leading_dot: false,
                },
            ),
            Self::InDirectory(dir) => {
                let parent = identity.directory();
                dir.is_empty()
                    || parent == dir
                    || parent
                        .strip_prefix(dir.as_str())
                        .map(|rest| rest.starts_with('/'))
                        .unwrap_or(false)
            }
            Self::All(all) => all.iter().all(|p| p.matches(identity, metadata)),
            Self::Any(any) => any.iter().any(|p| p.matches(identity, metadata)),
            Self::Not(inner) => !inner.matches(identity, metadata),
            Self::Custom(f) => f(identity, metadata),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetaEquals { key, value } => write!(f, "{} == {:?}", key, value),
            Self::MetaExists(key) => write!(f, "exists({})", key),
            Self::MetaMatches { key, pattern } => write!(f, "{} =~ /{}/", key, pattern.as_str()),
            Self::PathGlob(pattern) => write!(f, "path({})", pattern.as_str()),
            Self::InDirectory(dir) => write!(f, "dir({})", dir),
            Self::All(all) => f.debug_tuple("All").field(all).finish(),
            Self::Any(any) => f.debug_tuple("Any").field(any).finish(),
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_equals(value: &Value, expected: &str) -> bool {
    match value {
        Value::Sequence(items) => items.iter().any(|v| value_equals(v, expected)),
        other => scalar_text(other).map(|s| s == expected).unwrap_or(false),
    }
}

fn value_matches(value: &Value, pattern: &Regex) -> bool {
    match value {
        Value::Sequence(items) => items.iter().any(|v| value_matches(v, pattern)),
        other => scalar_text(other)
            .map(|s| pattern.is_match(&s))
            .unwrap_or(false),
    }
}

/// Predicate plus the layout it selects
#[derive(Debug, Clone)]
pub struct ResolutionRule {
    pub predicate: Predicate,
    pub layout: String,
}

impl ResolutionRule {
    pub fn new(predicate: Predicate, layout: impl Into<String>) -> Self {
        Self {
            predicate,
            layout: layout.into(),
        }
    }
}

/// How the layout was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSource {
    /// Named by the content's own metadata
    Override,
    /// Selected by the rule at this index
    Rule(usize),
    Fallback,
}

/// Where a declared slot gets its content from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotBinding<'r> {
    /// The content's slot marker of the same name
    Content(NodeId),
    /// Top-level content outside any slot marker
    Loose,
    /// The layout's declared default
    Default(&'r Document),
    /// Optional slot with nothing to bind
    Empty,
}

/// Resolved layout and slot bindings for one content item
#[derive(Debug)]
pub struct Resolution<'r, P> {
    pub layout: &'r LayoutDescriptor<P>,
    pub source: LayoutSource,
    /// Bindings for every declared slot, in declaration order
    pub bindings: IndexMap<&'r str, SlotBinding<'r>>,
}

/// Layout selection: metadata override, then first matching rule, then fallback
#[derive(Debug)]
pub struct Resolver<P> {
    registry: LayoutRegistry<P>,
    rules: Vec<ResolutionRule>,
    layout_key: String,
    fallback: String,
    default_slot: String,
}

impl<P> Resolver<P> {
    pub fn new(
        registry: LayoutRegistry<P>,
        rules: Vec<ResolutionRule>,
        layout_key: impl Into<String>,
        fallback: impl Into<String>,
        default_slot: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            rules,
            layout_key: layout_key.into(),
            fallback: fallback.into(),
            default_slot: default_slot.into(),
        }
    }

    pub fn registry(&self) -> &LayoutRegistry<P> {
        &self.registry
    }

    pub fn rules(&self) -> &[ResolutionRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn default_slot(&self) -> &str {
        &self.default_slot
    }

    /// Pick the layout identifier without checking it is registered
    pub fn select<'a>(
        &'a self,
        identity: &Identity,
        metadata: &'a Metadata,
    ) -> (&'a str, LayoutSource) {
        match metadata.get(&self.layout_key) {
            Some(Value::String(layout)) if !layout.trim().is_empty() => {
                return (layout.trim(), LayoutSource::Override)
            }
            Some(Value::Null) | None => {}
            Some(other) => tracing::warn!(
                "{}: ignoring non-string `{}` value {:?}",
                identity,
                self.layout_key,
                other
            ),
        }

        self.rules
            .iter()
            .position(|rule| rule.predicate.matches(identity, metadata))
            .map(|i| (self.rules[i].layout.as_str(), LayoutSource::Rule(i)))
            .unwrap_or((self.fallback.as_str(), LayoutSource::Fallback))
    }

    /// Resolve the layout for a content item and bind every declared slot
    pub fn resolve(
        &self,
        identity: &Identity,
        metadata: &Metadata,
        document: &Document,
    ) -> Result<Resolution<'_, P>> {
        let (layout_id, source) = self.select(identity, metadata);
        let layout = self.registry.get(layout_id).ok_or_else(|| {
            Error::new(
                identity,
                ErrorKind::UnknownLayout {
                    layout: layout_id.to_string(),
                },
            )
        })?;

        let markers = document.slots();
        let mut bindings = IndexMap::new();
        for slot in layout.slots() {
            let binding = if let Some(&id) = markers.get(slot.name.as_str()) {
                SlotBinding::Content(id)
            } else if slot.name == self.default_slot && document.has_loose_content() {
                SlotBinding::Loose
            } else if let Some(default) = layout.default_content(&slot.name) {
                SlotBinding::Default(default)
            } else if slot.optional {
                SlotBinding::Empty
            } else {
                return Err(Error::new(
                    identity,
                    ErrorKind::MissingRequiredSlot {
                        layout: layout.id().to_string(),
                        slot: slot.name.clone(),
                    },
                ));
            };
            bindings.insert(slot.name.as_str(), binding);
        }

        for name in markers.keys() {
            if !bindings.contains_key(name) {
                tracing::debug!(
                    "{}: slot `{}` is not declared by layout {}",
                    identity,
                    name,
                    layout.id()
                );
            }
        }

        tracing::debug!("{}: layout {} ({:?})", identity, layout.id(), source);
        Ok(Resolution {
            layout,
            source,
            bindings,
        })
    }
}
