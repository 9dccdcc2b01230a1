//! Content module - content items, front matter, discovery and markdown

mod frontmatter;
mod item;
pub mod loader;
mod markdown;

pub use frontmatter::{FrontMatter, FrontMatterError, Metadata};
pub use item::{ContentItem, Fingerprint, Identity, ParsedContent};
pub(crate) use item::{page_slug, page_title};
pub use loader::{ChangeSet, ContentSet};
pub use markdown::{markdown_options, HeadingIds, MarkdownRenderer};
