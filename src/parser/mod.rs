pub mod course;
pub mod page;

use std::collections::HashSet;

use tracing::debug;

use crate::normalize::normalize;
use course::is_course_url;
use page::{extract_page, ExtractedPage};

/// Everything the scan flow needs from one saved page, from a single parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImport {
    pub listing_links: Vec<String>,
    /// The page's own course URL, from canonical/og:url metadata only.
    pub course_url: Option<String>,
    pub title: Option<String>,
}

/// Parse once, then run the listing and strict-metadata extractions.
pub fn process_page(html: &str, base_url: &str) -> PageImport {
    let page = extract_page(html);
    PageImport {
        listing_links: course_links(&page, base_url),
        course_url: canonical_course_url(&page, base_url, true),
        title: page.title,
    }
}

/// Course links of a listing/search page, normalized, de-duplicated, first-seen order.
pub fn extract_course_links_from_listing(html: &str, base_url: &str) -> Vec<String> {
    course_links(&extract_page(html), base_url)
}

/// The course a single course page is about.
///
/// Candidates are tried in trust order: canonical link, og:url, then (unless
/// `strict_meta`) every anchor in document order. The first candidate that
/// normalizes and names a course wins.
pub fn extract_canonical_course_url(html: &str, base_url: &str, strict_meta: bool) -> Option<String> {
    canonical_course_url(&extract_page(html), base_url, strict_meta)
}

pub fn parse_title(html: &str) -> Option<String> {
    extract_page(html).title
}

fn course_links(page: &ExtractedPage, base_url: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in &page.hrefs {
        let url = match normalize(href, Some(base_url)) {
            Ok(url) => url,
            Err(e) => {
                debug!("skipping href {:?}: {}", href, e);
                continue;
            }
        };
        if !is_course_url(&url) || seen.contains(&url) {
            continue;
        }
        seen.insert(url.clone());
        links.push(url);
    }

    links
}

fn canonical_course_url(page: &ExtractedPage, base_url: &str, strict_meta: bool) -> Option<String> {
    let meta = [page.canonical_url.as_ref(), page.og_url.as_ref()]
        .into_iter()
        .flatten();
    let anchors = page.hrefs.iter().filter(|_| !strict_meta);

    meta.chain(anchors)
        .filter_map(|candidate| normalize(candidate, Some(base_url)).ok())
        .find(|url| is_course_url(url))
}

// ── Tests ──
