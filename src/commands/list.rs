//! List site content

use anyhow::Result;
use serde::Serialize;

use crate::content::ContentSet;
use crate::Site;

/// One listed content item
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub identity: String,
    pub layout: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub tags: Vec<String>,
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Collect listing entries for every content item, in identity order
pub fn entries(site: &Site) -> Result<Vec<Entry>> {
    let (set, _) = ContentSet::scan(&site.content_dir);
    let pipeline = site.pipeline()?;

    let entries = set
        .items()
        .map(|item| match pipeline.parse(item) {
            Ok(parsed) => {
                let (layout, _) = pipeline
                    .resolver()
                    .select(&parsed.identity, &parsed.metadata);
                Entry {
                    identity: parsed.identity.to_string(),
                    layout: Some(layout.to_string()),
                    title: Some(parsed.title()),
                    slug: Some(parsed.slug()),
                    tags: parsed.tags(),
                    date: parsed.date().map(|d| d.format("%Y-%m-%d").to_string()),
                    error: None,
                }
            }
            Err(e) => Entry {
                identity: item.identity().to_string(),
                layout: None,
                title: None,
                slug: None,
                tags: Vec::new(),
                date: None,
                error: Some(e.kind.to_string()),
            },
        })
        .collect();
    Ok(entries)
}

/// Print content items as text or JSON
pub fn run(site: &Site, json: bool) -> Result<()> {
    let entries = entries(site)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Content ({}):", entries.len());
    for entry in entries {
        match (&entry.error, &entry.layout) {
            (Some(error), _) => println!("  {} - error: {}", entry.identity, error),
            (None, Some(layout)) => println!(
                "  {} - {} [{} -> {}]",
                entry.date.as_deref().unwrap_or("----------"),
                entry.title.as_deref().unwrap_or(""),
                entry.identity,
                layout
            ),
            (None, None) => println!("  {}", entry.identity),
        }
    }

    Ok(())
}
