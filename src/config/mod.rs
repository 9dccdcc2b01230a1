//! Configuration module

mod site;

pub use site::{
    CacheConfig, ConfigError, LayoutConfig, MarkdownConfig, RuleConfig, SiteConfig, SlotConfig,
    SlotEntry,
};
