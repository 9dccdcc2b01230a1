//! Check the site: run the pipeline over every item without writing output

use anyhow::Result;
use rayon::prelude::*;

use crate::content::ContentSet;
use crate::error::Error;
use crate::Site;

/// Outcome of a check
#[derive(Debug, Default)]
pub struct CheckReport {
    pub checked: usize,
    pub errors: Vec<Error>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse, resolve and compose every content item in parallel
pub fn run(site: &Site) -> Result<CheckReport> {
    let (set, changes) = ContentSet::scan(&site.content_dir);
    let pipeline = site.pipeline()?;

    let items: Vec<_> = set.items().collect();
    let mut errors: Vec<Error> = items
        .par_iter()
        .filter_map(|item| pipeline.render(item).err())
        .collect();
    errors.extend(changes.failed);
    errors.sort_by(|a, b| a.identity.cmp(&b.identity));

    for e in &errors {
        match e.line() {
            Some(line) => println!("{}:{}: {}", e.identity, line, e.kind),
            None => println!("{}: {}", e.identity, e.kind),
        }
    }
    tracing::info!("Checked {} items, {} with errors", items.len(), errors.len());

    Ok(CheckReport {
        checked: items.len(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_collects_errors() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("ok.md"), "Fine").unwrap();
        fs::write(content.join("open.md"), "Intro\n\n:::note\nnever closed\n").unwrap();
        fs::write(content.join("bad.md"), "---\nlayout: nowhere\n---\nText").unwrap();

        let site = Site::new(tmp.path()).unwrap();
        let report = site.check().unwrap();

        assert_eq!(report.checked, 3);
        assert!(!report.is_ok());
        let ids: Vec<_> = report.errors.iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(ids, vec!["bad.md", "open.md"]);
        assert!(matches!(report.errors[0].kind, ErrorKind::UnknownLayout { .. }));
        assert_eq!(report.errors[1].line(), Some(3));
        assert!(!tmp.path().join("public").exists());
    }
}
