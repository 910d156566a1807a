use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::warn;

use crate::classify::Classification;
use crate::db::CourseRecord;
use crate::error::Result;
use crate::files::read_text_lossy;

pub const FULL_HEADER: [&str; 11] = [
    "id",
    "url",
    "title",
    "tags",
    "status",
    "classification",
    "class_reason",
    "html_path",
    "created_at",
    "updated_at",
    "last_opened_at",
];
pub const FREE_HEADER: [&str; 4] = ["id", "url", "title", "classification"];

/// One candidate line from a URL list, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Default)]
pub struct UrlList {
    pub entries: Vec<UrlEntry>,
    /// CSV rows the reader could not decode.
    pub unreadable: usize,
}

fn csv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out)
}

pub fn write_full_csv<W: Write>(out: W, records: &[CourseRecord]) -> Result<()> {
    let mut writer = csv_writer(out);
    writer.write_record(FULL_HEADER)?;
    for r in records {
        writer.write_record([
            r.id.to_string(),
            r.url.clone(),
            r.title.clone().unwrap_or_default(),
            r.tags.clone().unwrap_or_default(),
            r.status.to_string(),
            r.classification.to_string(),
            r.class_reason.clone().unwrap_or_default(),
            r.html_path.clone().unwrap_or_default(),
            r.created_at.clone(),
            r.updated_at.clone(),
            r.last_opened_at.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Rows are written as-is; callers pass only TRULY_FREE records.
pub fn write_free_csv<W: Write>(out: W, records: &[CourseRecord]) -> Result<()> {
    let mut writer = csv_writer(out);
    writer.write_record(FREE_HEADER)?;
    for r in records {
        writer.write_record([
            r.id.to_string(),
            r.url.clone(),
            r.title.clone().unwrap_or_default(),
            Classification::TrulyFree.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_full_csv(path: &Path, records: &[CourseRecord]) -> Result<()> {
    write_full_csv(File::create(path)?, records)
}

pub fn export_free_csv(path: &Path, records: &[CourseRecord]) -> Result<()> {
    write_free_csv(File::create(path)?, records)
}

/// Load candidate URLs from a `.csv` file or a plain one-URL-per-line list.
pub fn read_url_list(path: &Path) -> Result<UrlList> {
    let text = read_text_lossy(path)?;
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    Ok(if is_csv {
        parse_csv_list(&text)
    } else {
        parse_text_list(&text)
    })
}

/// One URL per line; blank lines and `#` comments are skipped.
pub fn parse_text_list(text: &str) -> UrlList {
    let entries = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| UrlEntry {
            url: line.to_string(),
            title: None,
        })
        .collect();
    UrlList {
        entries,
        unreadable: 0,
    }
}

/// CSV list. A header row naming a `url` column (and optionally `title`)
/// selects those columns, which lets an export be imported back. Without a
/// header the first two columns are url and title.
pub fn parse_csv_list(text: &str) -> UrlList {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut list = UrlList::default();
    let mut url_col = 0;
    let mut title_col = Some(1);

    for (i, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("skipping unreadable CSV row {}: {}", i + 1, e);
                list.unreadable += 1;
                continue;
            }
        };
        if i == 0 {
            if let Some(col) = row.iter().position(|c| c.trim().eq_ignore_ascii_case("url")) {
                url_col = col;
                title_col = row.iter().position(|c| c.trim().eq_ignore_ascii_case("title"));
                continue;
            }
        }

        let Some(url) = row.get(url_col).map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        let title = title_col
            .and_then(|c| row.get(c))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        list.entries.push(UrlEntry {
            url: url.to_string(),
            title,
        });
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Status;

    fn record(id: i64, url: &str, title: Option<&str>) -> CourseRecord {
        CourseRecord {
            id,
            url: url.to_string(),
            title: title.map(str::to_string),
            tags: Some("ml,python".to_string()),
            status: Status::Pending,
            classification: Classification::TrulyFree,
            class_reason: Some("matched 'Enroll for free' + 'No Certificate'; ok".to_string()),
            html_path: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            last_opened_at: None,
        }
    }

    #[test]
    fn full_csv_layout() {
        let mut buf = Vec::new();
        write_full_csv(&mut buf, &[record(1, "https://coursera.org/learn/a", Some("A, the course"))]).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,url,title,tags,status,classification,class_reason,html_path,created_at,updated_at,last_opened_at")
        );
        assert_eq!(
            lines.next(),
            Some("1,https://coursera.org/learn/a,\"A, the course\",\"ml,python\",pending,TRULY_FREE,matched 'Enroll for free' + 'No Certificate'; ok,,2026-01-01T00:00:00Z,2026-01-01T00:00:00Z,")
        );
    }

    #[test]
    fn free_csv_layout() {
        let mut buf = Vec::new();
        write_free_csv(&mut buf, &[record(7, "https://coursera.org/learn/b", None)]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "id,url,title,classification\n7,https://coursera.org/learn/b,,TRULY_FREE\n"
        );
    }

    #[test]
    fn text_list_skips_comments_and_blanks() {
        let list = parse_text_list("# saved\n\nhttps://coursera.org/learn/a\n   \n  https://coursera.org/learn/b  \n");
        let urls: Vec<&str> = list.entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://coursera.org/learn/a", "https://coursera.org/learn/b"]);
    }

    #[test]
    fn csv_list_without_header() {
        let list = parse_csv_list("https://coursera.org/learn/a,Course A\nhttps://coursera.org/learn/b\n\n");
        assert_eq!(
            list.entries,
            vec![
                UrlEntry { url: "https://coursera.org/learn/a".into(), title: Some("Course A".into()) },
                UrlEntry { url: "https://coursera.org/learn/b".into(), title: None },
            ]
        );
    }

    #[test]
    fn csv_list_with_simple_header() {
        let list = parse_csv_list("URL,title\nhttps://coursera.org/learn/a,A\n");
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].title.as_deref(), Some("A"));
    }

    #[test]
    fn export_reads_back() {
        let mut buf = Vec::new();
        write_full_csv(
            &mut buf,
            &[
                record(1, "https://coursera.org/learn/a", Some("A, the course")),
                record(2, "https://coursera.org/learn/b", None),
            ],
        )
        .unwrap();
        let list = parse_csv_list(&String::from_utf8(buf).unwrap());
        assert_eq!(
            list.entries,
            vec![
                UrlEntry { url: "https://coursera.org/learn/a".into(), title: Some("A, the course".into()) },
                UrlEntry { url: "https://coursera.org/learn/b".into(), title: None },
            ]
        );
    }
}
