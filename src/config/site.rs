//! Site configuration (_config.yml)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::directive::DEFAULT_MAX_DEPTH;
use crate::layout::{Predicate, ResolutionRule, SlotDeclaration};
use crate::pipeline::{DEFAULT_LAYOUT, DEFAULT_LAYOUT_KEY, DEFAULT_SLOT};

/// Configuration failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("rule {index} has no condition")]
    EmptyRule { index: usize },

    #[error("rule {index}: {message}")]
    InvalidRule { index: usize, message: String },
}

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub language: String,

    // Directory
    pub content_dir: String,
    pub public_dir: String,

    // Pipeline
    pub default_layout: String,
    pub layout_key: String,
    pub default_slot: String,
    pub max_nesting_depth: usize,
    pub cache: CacheConfig,
    pub markdown: MarkdownConfig,

    /// Layout rules, tried in order
    pub rules: Vec<RuleConfig>,
    /// Layouts rendered by the built-in HTML shell
    pub layouts: Vec<LayoutConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Slotpress".to_string(),
            language: "en".to_string(),

            content_dir: "content".to_string(),
            public_dir: "public".to_string(),

            default_layout: DEFAULT_LAYOUT.to_string(),
            layout_key: DEFAULT_LAYOUT_KEY.to_string(),
            default_slot: DEFAULT_SLOT.to_string(),
            max_nesting_depth: DEFAULT_MAX_DEPTH,
            cache: CacheConfig::default(),
            markdown: MarkdownConfig::default(),

            rules: Vec::new(),
            layouts: Vec::new(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from YAML text; empty text yields the defaults
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Resolution rules in configured order
    pub fn resolution_rules(&self) -> Result<Vec<ResolutionRule>, ConfigError> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| rule.to_rule(index))
            .collect()
    }

    /// Configured layouts, or a single `default_layout` taking the default
    /// slot when none are configured
    pub fn layouts(&self) -> Vec<LayoutConfig> {
        if !self.layouts.is_empty() {
            return self.layouts.clone();
        }
        vec![LayoutConfig {
            name: self.default_layout.clone(),
            slots: vec![SlotConfig::Name(self.default_slot.clone())],
        }]
    }
}

/// Render cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Markdown rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    /// syntect theme used for code blocks
    pub theme: String,
    pub line_numbers: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            theme: "base16-ocean.dark".to_string(),
            line_numbers: true,
        }
    }
}

/// One layout rule. Every condition given must hold.
///
/// ```yaml
/// rules:
///   - when: { type: post }
///     layout: post
///   - path: "docs/**/*.md"
///     layout: docs
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Metadata keys that must equal the given values
    pub when: IndexMap<String, serde_yaml::Value>,
    /// Metadata keys that must be present
    pub exists: Vec<String>,
    /// Metadata keys whose values must match the given regular expressions
    pub matches: IndexMap<String, String>,
    /// Glob over the content identity
    pub path: Option<String>,
    /// Directory the content must live in
    pub directory: Option<String>,
    pub layout: String,
}

impl RuleConfig {
    fn to_rule(&self, index: usize) -> Result<ResolutionRule, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidRule { index, message };

        if self.layout.trim().is_empty() {
            return Err(invalid("missing layout".to_string()));
        }

        let mut all = Vec::new();
        for (key, value) in &self.when {
            let value = match value {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => return Err(invalid(format!("`when.{}` must be a scalar, found {:?}", key, other))),
            };
            all.push(Predicate::meta_equals(key.as_str(), value));
        }
        for key in &self.exists {
            all.push(Predicate::meta_exists(key.as_str()));
        }
        for (key, pattern) in &self.matches {
            let predicate = Predicate::meta_matches(key.as_str(), pattern)
                .map_err(|e| invalid(format!("`matches.{}`: {}", key, e)))?;
            all.push(predicate);
        }
        if let Some(path) = &self.path {
            let predicate =
                Predicate::path_glob(path).map_err(|e| invalid(format!("`path`: {}", e)))?;
            all.push(predicate);
        }
        if let Some(dir) = &self.directory {
            all.push(Predicate::in_directory(dir.as_str()));
        }

        let predicate = match all.len() {
            0 => return Err(ConfigError::EmptyRule { index }),
            1 => all.remove(0),
            _ => Predicate::All(all),
        };
        Ok(ResolutionRule::new(predicate, self.layout.trim()))
    }
}

/// A layout for the built-in HTML shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub name: String,
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
}

/// Slot given either as a bare (required) name or in full
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotConfig {
    Name(String),
    Full(SlotEntry),
}

/// Full slot entry: the declaration plus how the HTML shell shows it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotEntry {
    #[serde(flatten)]
    pub slot: SlotDeclaration,
    /// Visibility condition over slot names, e.g. `"!sidebar"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_when: Option<String>,
}

impl SlotConfig {
    pub fn declaration(&self) -> SlotDeclaration {
        match self {
            SlotConfig::Name(name) => SlotDeclaration::required(name.as_str()),
            SlotConfig::Full(entry) => entry.slot.clone(),
        }
    }

    pub fn show_when(&self) -> Option<&str> {
        match self {
            SlotConfig::Name(_) => None,
            SlotConfig::Full(entry) => entry.show_when.as_deref(),
        }
    }
}
