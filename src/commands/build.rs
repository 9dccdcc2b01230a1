//! Build the site: render every content item into the public directory

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::RenderCache;
use crate::content::{ContentSet, Identity};
use crate::Site;

/// Outcome of a build
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Files written, relative to the public directory
    pub written: Vec<PathBuf>,
    /// Items that failed to load or render
    pub failed: Vec<Identity>,
}

/// Render all content in parallel and write one HTML file per item
pub fn run(site: &Site) -> Result<BuildReport> {
    let start = Instant::now();

    let (set, changes) = ContentSet::scan(&site.content_dir);
    tracing::info!("Loaded {} content items from {:?}", set.len(), site.content_dir);

    let pipeline = Arc::new(site.pipeline()?);
    let cache = RenderCache::with_capacity(pipeline, site.config.cache.max_entries);

    let items: Vec<_> = set.items().collect();
    let results: Vec<_> = items
        .par_iter()
        .map(|item| (item.identity(), cache.get_or_render(item)))
        .collect();

    let mut report = BuildReport {
        failed: changes.failed.iter().map(|e| e.identity.clone()).collect(),
        ..Default::default()
    };
    let mut outputs: HashMap<PathBuf, &Identity> = HashMap::new();

    for (identity, result) in results {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::error!("{}", e);
                report.failed.push(identity.clone());
                continue;
            }
        };

        let relative = page.output_path();
        if let Some(first) = outputs.get(&relative) {
            tracing::warn!(
                "Skipping {}: {:?} is already written by {}",
                identity,
                relative,
                first
            );
            report.failed.push(identity.clone());
            continue;
        }

        let target = site.public_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        fs::write(&target, &page.html).with_context(|| format!("Failed to write {:?}", target))?;
        tracing::debug!("Wrote {} -> {:?}", identity, relative);

        outputs.insert(relative.clone(), identity);
        report.written.push(relative);
    }

    let stats = cache.stats();
    tracing::info!(
        "Rendered {} pages ({} failed) in {:.2}s [cache: {} misses, {} hits]",
        report.written.len(),
        report.failed.len(),
        start.elapsed().as_secs_f64(),
        stats.misses,
        stats.hits
    );

    Ok(report)
}
