use std::sync::LazyLock;

use scraper::node::Element;
use scraper::{Html, Selector};

static TAG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a, title, link, meta").unwrap());

/// Links and identity metadata pulled out of one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    /// Every non-empty anchor href, in document order, duplicates kept.
    pub hrefs: Vec<String>,
    pub title: Option<String>,
    /// `<link rel="canonical">` target. Last match in the document wins.
    pub canonical_url: Option<String>,
    /// `<meta property|name="og:url">` content. Last match wins.
    pub og_url: Option<String>,
}

/// The attributes the extractor cares about, captured once per tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSnapshot {
    pub href: Option<String>,
    pub rel: Option<String>,
    pub property: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
}

impl TagSnapshot {
    fn capture(el: &Element) -> Self {
        let attr = |key: &str| {
            el.attr(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        TagSnapshot {
            href: attr("href"),
            rel: attr("rel"),
            property: attr("property"),
            name: attr("name"),
            content: attr("content"),
        }
    }

    fn is_canonical_link(&self) -> bool {
        self.rel.as_deref().is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("canonical"))
        })
    }

    fn is_og_url_meta(&self) -> bool {
        [&self.property, &self.name]
            .into_iter()
            .any(|v| v.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("og:url")))
    }
}

/// Parse `html` without running scripts. Malformed markup never fails; fields
/// that cannot be found stay empty.
pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);
    let mut page = ExtractedPage::default();
    let mut seen_title = false;

    for el in document.select(&TAG_SEL) {
        let tag = TagSnapshot::capture(el.value());
        match el.value().name() {
            "a" => {
                if let Some(href) = tag.href {
                    page.hrefs.push(href);
                }
            }
            "title" if !seen_title => {
                seen_title = true;
                let text: String = el.text().collect();
                let text = text.trim();
                if !text.is_empty() {
                    page.title = Some(text.to_string());
                }
            }
            "link" if tag.is_canonical_link() => {
                if let Some(href) = tag.href {
                    page.canonical_url = Some(href);
                }
            }
            "meta" if tag.is_og_url_meta() => {
                if let Some(content) = tag.content {
                    page.og_url = Some(content);
                }
            }
            _ => {}
        }
    }

    page
}
