//! Built-in HTML shell used by the command line for configured layouts
//!
//! Host applications register their own render functions; the shell exists
//! so a site can be built from `_config.yml` alone.

use serde::Serialize;
use std::path::PathBuf;

use crate::compose::Composition;
use crate::config::{LayoutConfig, SiteConfig};
use crate::content::Identity;
use crate::helpers::html_escape;
use crate::layout::{LayoutRegistry, RegistryError};

/// A rendered HTML page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub identity: Identity,
    pub layout: String,
    pub title: String,
    pub slug: String,
    pub html: String,
}

impl Page {
    /// Output path relative to the public directory: the identity's
    /// directory plus `<slug>.html`
    pub fn output_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for part in self.identity.directory().split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path.push(format!("{}.html", self.slug));
        path
    }
}

/// Register every configured layout with the HTML shell as its render function
pub fn register_layouts(
    registry: &mut LayoutRegistry<Page>,
    config: &SiteConfig,
) -> Result<(), RegistryError> {
    for layout in config.layouts() {
        let LayoutConfig { name, slots } = layout;
        let sections: Vec<Section> = slots
            .iter()
            .map(|slot| Section {
                name: slot.declaration().name,
                show_when: slot.show_when().map(str::to_string),
            })
            .collect();
        let slots: Vec<_> = slots.iter().map(|s| s.declaration()).collect();
        let site_title = config.title.clone();
        let language = config.language.clone();

        registry.register(name, slots, move |composition: &Composition<'_>| {
            render_shell(composition, &site_title, &language, &sections)
        })?;
    }
    Ok(())
}

/// One `<section>` of the shell, in slot declaration order
struct Section {
    name: String,
    show_when: Option<String>,
}

impl Section {
    /// Empty slots are left out, as are slots whose condition fails
    fn is_shown(&self, composition: &Composition<'_>) -> bool {
        composition.is_filled(&self.name)
            && self
                .show_when
                .as_deref()
                .map_or(true, |condition| composition.is_visible(condition))
    }
}

fn render_shell(
    composition: &Composition<'_>,
    site_title: &str,
    language: &str,
    sections: &[Section],
) -> Page {
    let title = composition.title();
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n");
    html.push_str(&format!("<html lang=\"{}\">\n<head>\n", html_escape(language)));
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>{} | {}</title>\n",
        html_escape(&title),
        html_escape(site_title)
    ));
    html.push_str("</head>\n");
    html.push_str(&format!(
        "<body class=\"layout-{}\">\n",
        html_escape(composition.layout)
    ));
    for section in sections.iter().filter(|s| s.is_shown(composition)) {
        html.push_str(&format!(
            "<section class=\"slot-{}\">\n{}</section>\n",
            section.name,
            composition.slot_html(&section.name)
        ));
    }
    html.push_str("</body>\n</html>\n");

    Page {
        identity: composition.identity.clone(),
        layout: composition.layout.to_string(),
        title,
        slug: composition.slug(),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentItem;
    use crate::pipeline::Pipeline;
    use std::path::Path;
    use std::time::SystemTime;

    fn pipeline(config: &SiteConfig) -> Pipeline<Page> {
        let mut registry = LayoutRegistry::new();
        register_layouts(&mut registry, config).unwrap();
        Pipeline::builder().registry(registry).build()
    }

    #[test]
    fn test_default_shell() {
        let config = SiteConfig::default();
        let item = ContentItem::new(
            "notes/hello-world.md",
            "---\ntitle: Hello <World>\n---\nSome *text*.\n",
            SystemTime::UNIX_EPOCH,
        );
        let page = pipeline(&config).render(&item).unwrap();

        assert_eq!(page.layout, "default");
        assert_eq!(page.title, "Hello <World>");
        assert_eq!(page.slug, "hello-world");
        assert_eq!(page.output_path(), Path::new("notes").join("hello-world.html"));
        assert!(page.html.contains("<title>Hello &lt;World&gt; | Slotpress</title>"));
        assert!(page
            .html
            .contains("<section class=\"slot-main\">\n<p>Some <em>text</em>.</p>\n</section>"));
    }

    #[test]
    fn test_configured_layout_slots() {
        let config = SiteConfig::from_yaml(
            "layouts:\n  - name: default\n    slots:\n      - main\n      - name: aside\n        optional: true\n",
        )
        .unwrap();
        let item = ContentItem::new(
            "index.md",
            "Body\n\n:::slot aside\nSide\n:::\n",
            SystemTime::UNIX_EPOCH,
        );
        let page = pipeline(&config).render(&item).unwrap();

        let main = page.html.find("slot-main").unwrap();
        let aside = page.html.find("slot-aside").unwrap();
        assert!(main < aside);
        assert!(page.html.contains("<p>Side</p>"));
        assert_eq!(page.output_path(), Path::new("index.html"));
    }

    #[test]
    fn test_empty_and_hidden_sections_are_left_out() {
        let config = SiteConfig::from_yaml(
            "layouts:\n  - name: default\n    slots:\n      - main\n      - name: aside\n        optional: true\n      - name: toc\n        optional: true\n        show_when: \"!aside\"\n      - name: footer\n        optional: true\n",
        )
        .unwrap();
        let pipeline = pipeline(&config);

        let item = ContentItem::new(
            "a.md",
            "Body\n\n:::slot toc\n- one\n:::\n",
            SystemTime::UNIX_EPOCH,
        );
        let page = pipeline.render(&item).unwrap();
        assert!(page.html.contains("slot-toc"));
        assert!(!page.html.contains("slot-aside"));
        assert!(!page.html.contains("slot-footer"));

        let item = ContentItem::new(
            "b.md",
            "Body\n\n:::slot toc\n- one\n:::\n\n:::slot aside\nSide\n:::\n",
            SystemTime::UNIX_EPOCH,
        );
        let page = pipeline.render(&item).unwrap();
        assert!(page.html.contains("slot-aside"));
        assert!(!page.html.contains("slot-toc"));
    }
}
