use std::sync::LazyLock;

use regex::Regex;
use url::{form_urlencoded, Url};

use crate::error::{Result, ShortlistError};

static SLASH_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/{2,}").unwrap());

const TRACKING_PARAM_PREFIXES: &[&str] = &["utm_"];
const TRACKING_PARAMS_EXACT: &[&str] = &["fbclid", "gclid", "ref", "referral", "trk"];

/// Query keys used only for analytics attribution.
pub fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAM_PREFIXES.iter().any(|p| key.starts_with(p))
        || TRACKING_PARAMS_EXACT.contains(&key.as_str())
}

/// Canonicalize a raw href into `https://{host}{path}{?query}`.
///
/// Relative hrefs are joined against `base` first. The host loses its case and
/// any leading `www.`, tracking params and the fragment are dropped, slash runs
/// in the path collapse to one and a non-root trailing slash is removed.
pub fn normalize(raw: &str, base: Option<&str>) -> Result<String> {
    let decoded = html_escape::decode_html_entities(raw.trim());
    let candidate = decoded.trim();
    if candidate.is_empty() {
        return Err(ShortlistError::invalid_url("empty URL"));
    }

    let parsed = match base.filter(|b| !b.trim().is_empty()) {
        Some(base) => Url::parse(base.trim()).and_then(|b| b.join(candidate)),
        None => Url::parse(candidate),
    }
    .map_err(|e| ShortlistError::invalid_url(format!("{candidate}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ShortlistError::invalid_url(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return Err(ShortlistError::invalid_url("URL missing host"));
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(parsed.query_pairs().filter(|(k, _)| !is_tracking_param(k)))
        .finish();

    let collapsed = SLASH_RUN_RE.replace_all(parsed.path(), "/");
    let path = match collapsed.as_ref() {
        "" | "/" => "/",
        p => p.strip_suffix('/').unwrap_or(p),
    };

    // Output is always https, where 443 is implied.
    let mut normalized = match parsed.port().filter(|&p| p != 443) {
        Some(port) => format!("https://{host}:{port}{path}"),
        None => format!("https://{host}{path}"),
    };
    if !query.is_empty() {
        normalized.push('?');
        normalized.push_str(&query);
    }
    Ok(normalized)
}
