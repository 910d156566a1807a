use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

const DEFAULT_CONFIG_NAME: &str = "shortlist";
const ENV_PREFIX: &str = "SHORTLIST";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Base for resolving relative hrefs in saved pages.
    pub base_url: String,
    pub free_csv: PathBuf,
    pub export_csv: PathBuf,
    /// Command used by `open-next`; platform opener when unset.
    pub browser: Option<String>,
}

impl Settings {
    /// Defaults, then `shortlist.toml` (or `config_file`), then `SHORTLIST_*` env vars.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let file = match config_file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let settings = Config::builder()
            .set_default("db_path", "course_shortlist.db")?
            .set_default("base_url", "https://www.coursera.org")?
            .set_default("free_csv", "truly_free_courses.csv")?
            .set_default("export_csv", "courses_export.csv")?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
