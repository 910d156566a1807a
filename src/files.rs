use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Result, ShortlistError};

const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

/// Read a file as UTF-8, replacing invalid sequences instead of failing.
pub fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ShortlistError::FileNotFound(path.to_path_buf()),
        _ => ShortlistError::Io(e),
    })?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("{} is not valid UTF-8, decoding lossily", path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ShortlistError::FileNotFound(path.to_path_buf()))
    }
}

pub fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| HTML_EXTENSIONS.iter().any(|h| ext.eq_ignore_ascii_case(h)))
}

/// A single `.html`/`.htm` file, or every one under a directory, sorted by
/// lowercased path.
pub fn collect_html_files(path: &Path) -> Result<Vec<PathBuf>> {
    ensure_exists(path)?;
    if path.is_file() {
        return Ok(if is_html_file(path) { vec![path.to_path_buf()] } else { Vec::new() });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_html_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    Ok(files)
}
