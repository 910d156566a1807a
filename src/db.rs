use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::classify::{Classification, Verdict};
use crate::error::Result;

const COURSE_COLUMNS: &str = "id, url, title, tags, status, classification, class_reason, html_path,
     created_at, updated_at, last_opened_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Opened,
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Opened => "opened",
            Status::Done => "done",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "opened" => Ok(Status::Opened),
            "done" => Ok(Status::Done),
            _ => Err(format!("unknown status {s:?} (expected pending, opened or done)")),
        }
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Classification {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Classification {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// One row of the `courses` table. The URL is the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRecord {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    /// Comma-joined, sorted, de-duplicated.
    pub tags: Option<String>,
    pub status: Status,
    pub classification: Classification,
    pub class_reason: Option<String>,
    pub html_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_opened_at: Option<String>,
}

impl CourseRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CourseRecord {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            tags: row.get(3)?,
            status: row.get(4)?,
            classification: row.get(5)?,
            class_reason: row.get(6)?,
            html_path: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            last_opened_at: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub truly_free: usize,
    pub paid_or_preview: usize,
    pub unknown: usize,
}

/// ISO-8601 UTC instant with second precision, e.g. `2026-10-19T08:30:00Z`.
pub fn utc_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Owned handle on the course database. The connection closes on drop.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("opening store at {}", path.display());
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS courses (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                url            TEXT NOT NULL UNIQUE,
                title          TEXT,
                tags           TEXT,
                status         TEXT NOT NULL DEFAULT 'pending',
                classification TEXT NOT NULL DEFAULT 'UNKNOWN',
                class_reason   TEXT,
                html_path      TEXT,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL,
                last_opened_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_courses_status ON courses(status);
            CREATE INDEX IF NOT EXISTS idx_courses_class ON courses(classification);
            ",
        )?;
        Ok(Store { conn })
    }

    // ── Writes ──

    /// Insert a new course or merge into the existing row for `url`.
    ///
    /// Merging never clears: tags are unioned, title and html_path are only
    /// replaced by new non-empty values. `updated_at` is always bumped.
    pub fn upsert_course(
        &self,
        url: &str,
        title: Option<&str>,
        tags: &[String],
        html_path: Option<&str>,
    ) -> Result<i64> {
        let now = utc_now();
        let title = title.filter(|t| !t.trim().is_empty());
        let html_path = html_path.filter(|p| !p.is_empty());

        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<(i64, Option<String>)> = tx
            .query_row(
                "SELECT id, tags FROM courses WHERE url = ?1",
                [url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let id = match existing {
            Some((id, old_tags)) => {
                let merged = join_tags(split_tags(old_tags.as_deref()).chain(clean_tags(tags)));
                tx.execute(
                    "UPDATE courses
                     SET title = COALESCE(?1, title),
                         tags = ?2,
                         html_path = COALESCE(?3, html_path),
                         updated_at = ?4
                     WHERE id = ?5",
                    params![title, merged, html_path, now, id],
                )?;
                debug!("merged course id={} url={}", id, url);
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO courses
                     (url, title, tags, status, classification, class_reason, html_path, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![
                        url,
                        title,
                        join_tags(clean_tags(tags)),
                        Status::Pending,
                        Classification::Unknown,
                        "not yet classified",
                        html_path,
                        now,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                debug!("inserted course id={} url={}", id, url);
                id
            }
        };
        tx.commit()?;
        Ok(id)
    }

    pub fn set_classification(&self, id: i64, verdict: &Verdict) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE courses SET classification = ?1, class_reason = ?2, updated_at = ?3 WHERE id = ?4",
            params![verdict.classification, verdict.reason, utc_now(), id],
        )?;
        Ok(changed > 0)
    }

    /// Write a whole classification sweep in one transaction.
    pub fn apply_classifications(&self, verdicts: &[(i64, Verdict)]) -> Result<()> {
        let now = utc_now();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE courses SET classification = ?1, class_reason = ?2, updated_at = ?3 WHERE id = ?4",
            )?;
            for (id, v) in verdicts {
                stmt.execute(params![v.classification, v.reason, now, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn mark_opened(&self, id: i64) -> Result<bool> {
        let now = utc_now();
        let changed = self.conn.execute(
            "UPDATE courses SET status = ?1, updated_at = ?2, last_opened_at = ?2 WHERE id = ?3",
            params![Status::Opened, now, id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_done(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE courses SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![Status::Done, utc_now(), id],
        )?;
        Ok(changed > 0)
    }

    /// Bulk reset. Returns the number of rows removed.
    pub fn clear_all(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM courses", [])?)
    }

    // ── Reads ──

    pub fn fetch_all(&self) -> Result<Vec<CourseRecord>> {
        self.fetch_filtered(None, None)
    }

    pub fn fetch_by_id(&self, id: i64) -> Result<Option<CourseRecord>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], CourseRecord::from_row)
            .optional()?)
    }

    pub fn fetch_filtered(
        &self,
        status: Option<Status>,
        classification: Option<Classification>,
    ) -> Result<Vec<CourseRecord>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(s) = status {
            conditions.push(format!("status = ?{}", params.len() + 1));
            params.push(Box::new(s));
        }
        if let Some(c) = classification {
            conditions.push(format!("classification = ?{}", params.len() + 1));
            params.push(Box::new(c));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses{where_clause} ORDER BY id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), CourseRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Lowest-id pending course, optionally restricted to TRULY_FREE ones.
    pub fn next_pending(&self, only_free: bool) -> Result<Option<CourseRecord>> {
        let classification = only_free.then_some(Classification::TrulyFree);
        Ok(self
            .fetch_filtered(Some(Status::Pending), classification)?
            .into_iter()
            .next())
    }

    pub fn count_by_classification(&self) -> Result<ClassCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT classification, COUNT(*) FROM courses GROUP BY classification")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, Classification>(0)?, row.get::<_, usize>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = ClassCounts::default();
        for (class, n) in rows {
            match class {
                Classification::TrulyFree => counts.truly_free = n,
                Classification::PaidOrPreview => counts.paid_or_preview = n,
                Classification::Unknown => counts.unknown = n,
            }
        }
        Ok(counts)
    }
}

fn clean_tags(tags: &[String]) -> impl Iterator<Item = String> + '_ {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn split_tags(raw: Option<&str>) -> impl Iterator<Item = String> + '_ {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn join_tags(tags: impl Iterator<Item = String>) -> Option<String> {
    let set: BTreeSet<String> = tags.collect();
    if set.is_empty() {
        None
    } else {
        Some(set.into_iter().collect::<Vec<_>>().join(","))
    }
}
