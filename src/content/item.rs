//! Content items and their identities

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::frontmatter::{FrontMatter, Metadata};
use crate::directive::{self, Document};
use crate::error::{Error, Result};

/// Stable key for a content item, derived from its path relative to the
/// content root with `/` separators (e.g. `posts/hello.md`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Build an identity from a path under `root`
    pub fn from_path(root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let parts: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        Self(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory part of the identity (empty at the content root)
    pub fn directory(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Identity> for Identity {
    fn from(identity: &Identity) -> Self {
        identity.clone()
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash of a source's bytes and modification time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn compute(raw: &str, modified: SystemTime) -> Self {
        let mut hasher = DefaultHasher::new();
        raw.hash(&mut hasher);
        match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => {
                d.as_secs().hash(&mut hasher);
                d.subsec_nanos().hash(&mut hasher);
            }
            // Pre-epoch mtimes still need to be distinguishable
            Err(e) => {
                1u8.hash(&mut hasher);
                e.duration().as_nanos().hash(&mut hasher);
            }
        }
        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A content source: raw text plus the identity and mtime it was read with
#[derive(Debug, Clone)]
pub struct ContentItem {
    identity: Identity,
    raw: Arc<str>,
    modified: SystemTime,
    fingerprint: Fingerprint,
}

impl ContentItem {
    pub fn new(identity: impl Into<Identity>, raw: impl Into<Arc<str>>, modified: SystemTime) -> Self {
        let raw = raw.into();
        let fingerprint = Fingerprint::compute(&raw, modified);
        Self {
            identity: identity.into(),
            raw,
            modified,
            fingerprint,
        }
    }

    /// Read a content file from disk
    pub fn load(root: &Path, path: &Path) -> Result<Self> {
        let identity = Identity::from_path(root, path);
        let read = || -> std::io::Result<(String, SystemTime)> {
            let raw = fs::read_to_string(path)?;
            let modified = fs::metadata(path)?.modified()?;
            Ok((raw, modified))
        };
        let (raw, modified) = read().map_err(|e| Error::new(&identity, e))?;
        Ok(Self::new(identity, raw, modified))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Run the front-matter and block extension parsers over the raw text
    pub fn parse(&self, max_depth: usize) -> Result<ParsedContent> {
        let fm = FrontMatter::parse(&self.raw).map_err(|e| Error::new(&self.identity, e))?;
        let document = directive::parse(fm.body, fm.body_line, max_depth)
            .map_err(|e| Error::new(&self.identity, e))?;

        tracing::debug!(
            "Parsed {}: {} metadata keys, {} nodes",
            self.identity,
            fm.metadata.len(),
            document.len()
        );

        Ok(ParsedContent {
            identity: self.identity.clone(),
            metadata: fm.metadata,
            document,
        })
    }
}

/// Metadata and annotated body tree of one content item
#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub identity: Identity,
    pub metadata: Metadata,
    pub document: Document,
}

impl ParsedContent {
    /// Slug from metadata, or the file stem
    pub fn slug(&self) -> String {
        page_slug(&self.identity, &self.metadata)
    }

    /// Title from metadata, or the slug in title case
    pub fn title(&self) -> String {
        page_title(&self.identity, &self.metadata)
    }

    pub fn tags(&self) -> Vec<String> {
        self.metadata.string_list("tags")
    }

    pub fn date(&self) -> Option<DateTime<Local>> {
        self.metadata.date("date")
    }
}

/// Metadata slugs are slugified too; they become output file names
pub(crate) fn page_slug(identity: &Identity, metadata: &Metadata) -> String {
    metadata
        .get_str("slug")
        .map(slug::slugify)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| slug::slugify(identity.stem()))
}

pub(crate) fn page_title(identity: &Identity, metadata: &Metadata) -> String {
    if let Some(title) = metadata.get_str("title") {
        return title.to_string();
    }
    page_slug(identity, metadata)
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
