use url::Url;

pub const TARGET_HOST: &str = "coursera.org";
pub const COURSE_PATH_PREFIXES: &[&str] = &["/learn/", "/specializations/", "/professional-certificates/"];

/// True for course, specialization and professional-certificate pages on the
/// bare target host. Expects a normalized URL but tolerates `www.` and casing.
pub fn is_course_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host != TARGET_HOST || parsed.port().is_some() {
        return false;
    }
    COURSE_PATH_PREFIXES
        .iter()
        .any(|prefix| parsed.path().starts_with(prefix))
}
