use std::path::{Path, PathBuf};
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::browser::Launcher;
use crate::classify::{classify, Classification, Verdict};
use crate::db::{ClassCounts, CourseRecord, Status, Store};
use crate::error::{Result, ShortlistError};
use crate::export;
use crate::files::{collect_html_files, ensure_exists, read_text_lossy};
use crate::normalize::normalize;
use crate::parser::course::is_course_url;
use crate::parser::{extract_canonical_course_url, extract_course_links_from_listing, parse_title, process_page};

// ── add-url / import ──

/// Normalize and store a single course URL.
pub fn add_url(store: &Store, raw: &str, tags: &[String]) -> Result<(i64, String)> {
    let url = normalize(raw, None)?;
    if !is_course_url(&url) {
        return Err(ShortlistError::usage(
            "URL must be a coursera.org course/specialization/professional-certificate link.",
        ));
    }
    let id = store.upsert_course(&url, None, tags, None)?;
    Ok((id, url))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub added: usize,
    pub skipped: usize,
}

impl ImportCounts {
    pub fn print(&self) {
        println!(
            "Imported URLs: added_or_updated={} skipped={}",
            self.added, self.skipped
        );
    }
}

/// Bulk import from a text or CSV list. Bad lines are counted, never fatal.
pub fn import_urls(store: &Store, path: &Path) -> Result<ImportCounts> {
    ensure_exists(path)?;
    let list = export::read_url_list(path)?;
    let mut counts = ImportCounts {
        added: 0,
        skipped: list.unreadable,
    };

    for entry in &list.entries {
        match normalize(&entry.url, None) {
            Ok(url) if is_course_url(&url) => {
                store.upsert_course(&url, entry.title.as_deref(), &[], None)?;
                counts.added += 1;
            }
            Ok(url) => {
                debug!("not a course URL: {}", url);
                counts.skipped += 1;
            }
            Err(e) => {
                debug!("skipping {:?}: {}", entry.url, e);
                counts.skipped += 1;
            }
        }
    }

    info!("import-urls {}: {:?}", path.display(), counts);
    Ok(counts)
}

/// Returns (extracted, stored).
pub fn import_listing_html(store: &Store, path: &Path, base_url: &str) -> Result<(usize, usize)> {
    let html = read_text_lossy(path)?;
    let urls = extract_course_links_from_listing(&html, base_url);
    let mut stored = 0;
    for url in &urls {
        store.upsert_course(url, None, &[], None)?;
        stored += 1;
    }
    Ok((urls.len(), stored))
}

pub struct CourseImport {
    pub id: i64,
    pub url: String,
    pub html_path: PathBuf,
}

/// Attach one saved course page to its record, creating it if needed.
pub fn import_course_html(store: &Store, path: &Path, base_url: &str) -> Result<CourseImport> {
    let html = read_text_lossy(path)?;
    let url = extract_canonical_course_url(&html, base_url, false).ok_or_else(|| {
        ShortlistError::usage(
            "Could not find a Coursera course URL in the file (canonical/og:url/link).",
        )
    })?;
    let title = parse_title(&html);
    let html_path = path.canonicalize()?;
    let id = store.upsert_course(
        &url,
        title.as_deref(),
        &[],
        Some(&html_path.to_string_lossy()),
    )?;
    Ok(CourseImport { id, url, html_path })
}

// ── classification ──

/// Classify the saved HTML behind a record. Missing or unreadable files
/// become UNKNOWN with the cause as reason.
pub fn classify_record(record: &CourseRecord) -> Verdict {
    let Some(html_path) = record.html_path.as_deref() else {
        return Verdict::unknown("no imported course HTML (use import-course-html)");
    };
    match read_text_lossy(Path::new(html_path)) {
        Ok(html) => classify(&html),
        Err(ShortlistError::FileNotFound(_)) => Verdict::unknown(format!("html file missing: {html_path}")),
        Err(e) => {
            warn!("could not read {}: {}", html_path, e);
            Verdict::unknown(format!("html file unreadable: {e}"))
        }
    }
}

/// Recompute every record in one transaction.
pub fn classify_all(store: &Store) -> Result<Vec<(CourseRecord, Verdict)>> {
    let records = store.fetch_all()?;
    let results: Vec<(CourseRecord, Verdict)> = records
        .into_iter()
        .map(|r| {
            let v = classify_record(&r);
            (r, v)
        })
        .collect();
    let updates: Vec<(i64, Verdict)> = results.iter().map(|(r, v)| (r.id, v.clone())).collect();
    store.apply_classifications(&updates)?;
    Ok(results)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyTarget {
    All,
    Id(i64),
}

impl FromStr for ClassifyTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(ClassifyTarget::All);
        }
        s.parse()
            .map(ClassifyTarget::Id)
            .map_err(|_| "classify target must be an integer id or 'all'.".to_string())
    }
}

pub fn classify_target(store: &Store, target: ClassifyTarget) -> Result<Vec<(CourseRecord, Verdict)>> {
    match target {
        ClassifyTarget::All => classify_all(store),
        ClassifyTarget::Id(id) => {
            let Some(record) = store.fetch_by_id(id)? else {
                return Ok(Vec::new());
            };
            let verdict = classify_record(&record);
            store.set_classification(record.id, &verdict)?;
            Ok(vec![(record, verdict)])
        }
    }
}

// ── quick-free-list ──

#[derive(Debug, Clone)]
pub struct QuickListReport {
    pub html_files: usize,
    pub listing_links: usize,
    pub course_pages: usize,
    pub counts: ClassCounts,
    pub free: Vec<CourseRecord>,
    pub csv_path: Option<PathBuf>,
}

impl QuickListReport {
    pub fn print(&self) {
        println!(
            "Scanned HTML files={} listing_links={} course_pages_with_meta_url={}",
            self.html_files, self.listing_links, self.course_pages
        );
        println!(
            "Classified: TRULY_FREE={} PAID_OR_PREVIEW={} UNKNOWN={}",
            self.counts.truly_free, self.counts.paid_or_preview, self.counts.unknown
        );
        if self.free.is_empty() {
            println!("\nNo TRULY_FREE courses found yet.");
            println!("Tip: save course pages after clicking 'Enroll for free' and showing the enroll modal.");
        } else {
            println!("\nTRULY_FREE courses:");
            for r in &self.free {
                let title = r.title.as_deref().map(|t| format!(" | {t}")).unwrap_or_default();
                println!("{:>4} | {}{}", r.id, r.url, title);
            }
        }
        if let Some(path) = &self.csv_path {
            println!("Wrote TRULY_FREE CSV: {}", path.display());
        }
    }
}

/// Scan saved pages, store what they link to and what they are, classify
/// everything and report the truly free courses.
pub fn quick_free_list(
    store: &Store,
    path: &Path,
    fresh: bool,
    output: Option<&Path>,
    base_url: &str,
) -> Result<QuickListReport> {
    ensure_exists(path)?;
    if fresh {
        let removed = store.clear_all()?;
        info!("cleared {} existing records", removed);
    }

    let html_files = collect_html_files(path)?;
    if html_files.is_empty() {
        return Err(ShortlistError::usage("no .html/.htm files found at provided path."));
    }

    let pb = ProgressBar::new(html_files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut listing_links = 0;
    let mut course_pages = 0;
    for file in &html_files {
        pb.set_message(file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default());
        let html = read_text_lossy(file)?;
        let page = process_page(&html, base_url);

        for url in &page.listing_links {
            store.upsert_course(url, None, &[], None)?;
        }
        listing_links += page.listing_links.len();

        if let Some(url) = &page.course_url {
            let html_path = file.canonicalize()?;
            store.upsert_course(
                url,
                page.title.as_deref(),
                &[],
                Some(&html_path.to_string_lossy()),
            )?;
            course_pages += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    classify_all(store)?;
    let counts = store.count_by_classification()?;
    let free = store.fetch_filtered(None, Some(Classification::TrulyFree))?;

    if let Some(out) = output {
        export::export_free_csv(out, &free)?;
    }

    Ok(QuickListReport {
        html_files: html_files.len(),
        listing_links,
        course_pages,
        counts,
        free,
        csv_path: output.map(Path::to_path_buf),
    })
}

// ── list / open-next / mark-done / export ──

pub fn list_records(
    store: &Store,
    status: Option<Status>,
    classification: Option<Classification>,
) -> Result<Vec<CourseRecord>> {
    store.fetch_filtered(status, classification)
}

pub fn print_records(records: &[CourseRecord]) {
    if records.is_empty() {
        println!("No courses found.");
        return;
    }
    for r in records {
        let title = r.title.as_deref().map(|t| format!(" | {t}")).unwrap_or_default();
        println!(
            "{:>4} | {:<7} | {:<16} | {}{}",
            r.id,
            r.status.as_str(),
            r.classification.as_str(),
            r.url,
            title
        );
        if let Some(reason) = r.class_reason.as_deref().filter(|s| !s.is_empty()) {
            println!("      reason: {reason}");
        }
    }
}

/// Open the next pending course and mark it opened. `None` when nothing is pending.
pub fn open_next(store: &Store, only_free: bool, launcher: &dyn Launcher) -> Result<Option<CourseRecord>> {
    let Some(record) = store.next_pending(only_free)? else {
        return Ok(None);
    };
    launcher.open(&record.url)?;
    store.mark_opened(record.id)?;
    Ok(store.fetch_by_id(record.id)?)
}

pub fn mark_done(store: &Store, id: i64) -> Result<()> {
    if store.mark_done(id)? {
        Ok(())
    } else {
        Err(ShortlistError::usage(format!("course id {id} not found.")))
    }
}

pub fn export_csv(store: &Store, output: &Path) -> Result<usize> {
    let records = store.fetch_all()?;
    export::export_full_csv(output, &records)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use super::*;

    struct FakeBrowser {
        opened: RefCell<Vec<String>>,
        fail: bool,
    }

    impl FakeBrowser {
        fn new(fail: bool) -> Self {
            FakeBrowser {
                opened: RefCell::new(Vec::new()),
                fail,
            }
        }
    }

    impl Launcher for FakeBrowser {
        fn open(&self, url: &str) -> Result<()> {
            if self.fail {
                return Err(ShortlistError::Browser("no display".to_string()));
            }
            self.opened.borrow_mut().push(url.to_string());
            Ok(())
        }
    }

    const BASE: &str = "https://www.coursera.org";

    fn copy_fixture(dir: &Path, name: &str) -> PathBuf {
        let dest = dir.join(format!("{name}.html"));
        fs::copy(format!("tests/fixtures/{name}.html"), &dest).unwrap();
        dest
    }

    #[test]
    fn add_url_normalizes_and_filters() {
        let store = Store::open_in_memory().unwrap();
        let (id, url) = add_url(
            &store,
            "https://WWW.coursera.org/learn/x/?utm_source=a#top",
            &["ml".to_string()],
        )
        .unwrap();
        assert_eq!(url, "https://coursera.org/learn/x");
        assert_eq!(store.fetch_by_id(id).unwrap().unwrap().tags.as_deref(), Some("ml"));

        assert!(matches!(
            add_url(&store, "https://coursera.org/projects/x", &[]),
            Err(ShortlistError::Usage(_))
        ));
        assert!(matches!(
            add_url(&store, "not a url", &[]),
            Err(ShortlistError::InvalidUrl(_))
        ));
    }

    #[test]
    fn import_urls_counts_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        fs::write(
            &list,
            "# my list\nhttps://www.coursera.org/learn/a\n\nhttps://coursera.org/learn/a?utm_source=x\nhttps://example.com/learn/b\nftp://coursera.org/learn/c\n",
        )
        .unwrap();

        let store = Store::open_in_memory().unwrap();
        let counts = import_urls(&store, &list).unwrap();
        assert_eq!(counts, ImportCounts { added: 2, skipped: 2 });
        assert_eq!(store.fetch_all().unwrap().len(), 1);
    }

    #[test]
    fn import_urls_missing_file() {
        let store = Store::open_in_memory().unwrap();
        let err = import_urls(&store, Path::new("/nonexistent/urls.txt")).unwrap_err();
        assert!(matches!(err, ShortlistError::FileNotFound(_)));
    }

    #[test]
    fn export_then_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        store.upsert_course("https://coursera.org/learn/a", Some("A, with comma"), &[], None).unwrap();
        store.upsert_course("https://coursera.org/specializations/b", None, &[], None).unwrap();
        let out = dir.path().join("export.csv");
        assert_eq!(export_csv(&store, &out).unwrap(), 2);

        let fresh = Store::open_in_memory().unwrap();
        let counts = import_urls(&fresh, &out).unwrap();
        assert_eq!(counts, ImportCounts { added: 2, skipped: 0 });
        import_urls(&fresh, &out).unwrap();

        let original: Vec<(String, Option<String>)> =
            store.fetch_all().unwrap().into_iter().map(|r| (r.url, r.title)).collect();
        let reimported: Vec<(String, Option<String>)> =
            fresh.fetch_all().unwrap().into_iter().map(|r| (r.url, r.title)).collect();
        assert_eq!(original, reimported);
    }

    #[test]
    fn listing_import() {
        let dir = tempfile::tempdir().unwrap();
        let listing = copy_fixture(dir.path(), "listing");
        let store = Store::open_in_memory().unwrap();
        assert_eq!(import_listing_html(&store, &listing, BASE).unwrap(), (3, 3));
        assert_eq!(import_listing_html(&store, &listing, BASE).unwrap(), (3, 3));
        assert_eq!(store.fetch_all().unwrap().len(), 3);
    }

    #[test]
    fn course_import_then_classify() {
        let dir = tempfile::tempdir().unwrap();
        let page = copy_fixture(dir.path(), "course_truly_free");
        let store = Store::open_in_memory().unwrap();

        let imported = import_course_html(&store, &page, BASE).unwrap();
        assert_eq!(imported.url, "https://coursera.org/learn/intro-to-sql");
        assert!(imported.html_path.is_absolute());

        let record = store.fetch_by_id(imported.id).unwrap().unwrap();
        assert_eq!(record.title.as_deref(), Some("Intro to SQL | Coursera"));

        let results = classify_target(&store, ClassifyTarget::Id(imported.id)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.classification, Classification::TrulyFree);
        assert_eq!(
            store.fetch_by_id(imported.id).unwrap().unwrap().classification,
            Classification::TrulyFree
        );
        assert!(classify_target(&store, ClassifyTarget::Id(999)).unwrap().is_empty());
    }

    #[test]
    fn course_import_without_course_url() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("blank.html");
        fs::write(&page, "<title>Nothing here</title>").unwrap();
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            import_course_html(&store, &page, BASE),
            Err(ShortlistError::Usage(_))
        ));
    }

    #[test]
    fn record_without_html_or_missing_file() {
        let store = Store::open_in_memory().unwrap();
        let a = store.upsert_course("https://coursera.org/learn/a", None, &[], None).unwrap();
        let b = store
            .upsert_course("https://coursera.org/learn/b", None, &[], Some("/nonexistent/b.html"))
            .unwrap();
        let results = classify_target(&store, ClassifyTarget::All).unwrap();
        let reasons: Vec<(i64, String)> = results.into_iter().map(|(r, v)| (r.id, v.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (a, "no imported course HTML (use import-course-html)".to_string()),
                (b, "html file missing: /nonexistent/b.html".to_string()),
            ]
        );
        let counts = store.count_by_classification().unwrap();
        assert_eq!(counts.unknown, 2);
    }

    #[test]
    fn quick_free_list_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let pages = dir.path().join("pages");
        fs::create_dir_all(&pages).unwrap();
        for name in ["listing", "course_truly_free", "course_paid", "course_unknown"] {
            copy_fixture(&pages, name);
        }
        let out = dir.path().join("free.csv");

        let store = Store::open_in_memory().unwrap();
        store.upsert_course("https://coursera.org/learn/stale", None, &[], None).unwrap();
        let report = quick_free_list(&store, &pages, true, Some(&out), BASE).unwrap();

        assert_eq!(report.html_files, 4);
        // listing: 3, truly free page: 1 related link
        assert_eq!(report.listing_links, 4);
        assert_eq!(report.course_pages, 3);
        assert_eq!(report.counts, ClassCounts { truly_free: 1, paid_or_preview: 1, unknown: 5 });
        assert_eq!(report.free.len(), 1);
        assert_eq!(report.free[0].url, "https://coursera.org/learn/intro-to-sql");
        assert!(store.fetch_all().unwrap().iter().all(|r| !r.url.ends_with("/stale")));

        let csv = fs::read_to_string(&out).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("id,url,title,classification"));
        assert!(lines.next().unwrap().ends_with(",https://coursera.org/learn/intro-to-sql,Intro to SQL | Coursera,TRULY_FREE"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn quick_free_list_needs_html() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            quick_free_list(&store, dir.path(), false, None, BASE),
            Err(ShortlistError::Usage(_))
        ));
        assert!(matches!(
            quick_free_list(&store, &dir.path().join("missing"), false, None, BASE),
            Err(ShortlistError::FileNotFound(_))
        ));
    }

    #[test]
    fn open_next_marks_opened() {
        let store = Store::open_in_memory().unwrap();
        let a = store.upsert_course("https://coursera.org/learn/a", None, &[], None).unwrap();
        let b = store.upsert_course("https://coursera.org/learn/b", None, &[], None).unwrap();
        store
            .set_classification(b, &Verdict::new(Classification::TrulyFree, "free"))
            .unwrap();

        let browser = FakeBrowser::new(false);
        let opened = open_next(&store, true, &browser).unwrap().unwrap();
        assert_eq!(opened.id, b);
        assert_eq!(opened.status, Status::Opened);
        assert!(opened.last_opened_at.is_some());

        assert!(open_next(&store, true, &browser).unwrap().is_none());
        assert_eq!(open_next(&store, false, &browser).unwrap().unwrap().id, a);
        assert_eq!(
            *browser.opened.borrow(),
            vec!["https://coursera.org/learn/b".to_string(), "https://coursera.org/learn/a".to_string()]
        );
    }

    #[test]
    fn open_next_browser_failure_leaves_status() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_course("https://coursera.org/learn/a", None, &[], None).unwrap();
        let err = open_next(&store, false, &FakeBrowser::new(true)).unwrap_err();
        assert!(matches!(err, ShortlistError::Browser(_)));
        assert_eq!(store.fetch_by_id(id).unwrap().unwrap().status, Status::Pending);
    }

    #[test]
    fn mark_done_unknown_id() {
        let store = Store::open_in_memory().unwrap();
        let id = store.upsert_course("https://coursera.org/learn/a", None, &[], None).unwrap();
        mark_done(&store, id).unwrap();
        assert_eq!(store.fetch_by_id(id).unwrap().unwrap().status, Status::Done);
        assert!(matches!(mark_done(&store, id + 1), Err(ShortlistError::Usage(_))));
    }

    #[test]
    fn classify_target_parsing() {
        assert_eq!("all".parse::<ClassifyTarget>().unwrap(), ClassifyTarget::All);
        assert_eq!("ALL".parse::<ClassifyTarget>().unwrap(), ClassifyTarget::All);
        assert_eq!("12".parse::<ClassifyTarget>().unwrap(), ClassifyTarget::Id(12));
        assert!("twelve".parse::<ClassifyTarget>().is_err());
    }
}
