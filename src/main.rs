mod browser;
mod classify;
mod commands;
mod config;
mod db;
mod error;
mod export;
mod files;
mod normalize;
mod parser;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use crate::browser::SystemBrowser;
use crate::classify::Classification;
use crate::commands::ClassifyTarget;
use crate::config::Settings;
use crate::db::{Status, Store};

#[derive(Parser)]
#[command(
    name = "course_shortlist",
    about = "Shortlist Coursera courses that are truly free (full course, no certificate)"
)]
struct Cli {
    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (default: ./shortlist.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add or update one course URL
    AddUrl {
        url: String,
        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Import URLs from a .txt (one per line) or .csv file
    ImportUrls { path: PathBuf },
    /// Import course links from a saved listing/search page
    ImportHtml { path: PathBuf },
    /// Attach a saved course page to its course record
    ImportCourseHtml { path: PathBuf },
    /// Scan saved pages, classify everything, print and write the TRULY_FREE list
    QuickFreeList {
        /// A saved .html file or a directory of them
        path: PathBuf,
        /// Clear the database first
        #[arg(long)]
        fresh: bool,
        /// CSV output (default from config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Reclassify one course id, or `all`
    Classify { target: ClassifyTarget },
    /// List stored courses
    List {
        /// pending, opened or done
        #[arg(long)]
        status: Option<Status>,
        /// TRULY_FREE, PAID_OR_PREVIEW or UNKNOWN
        #[arg(long = "class")]
        class: Option<Classification>,
    },
    /// Open the next pending course in the browser
    OpenNext {
        /// Only consider TRULY_FREE courses
        #[arg(long)]
        only_free: bool,
    },
    /// Mark a course as done
    MarkDone { id: i64 },
    /// Export every record
    Export {
        #[arg(value_enum)]
        format: ExportFormat,
        /// Output path (default from config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    let store = Store::open(&settings.db_path)
        .with_context(|| format!("opening {}", settings.db_path.display()))?;

    match cli.command {
        Commands::AddUrl { url, tags } => {
            let (id, url) = commands::add_url(&store, &url, &tags)?;
            println!("Added/updated course id={} url={}", id, url);
        }
        Commands::ImportUrls { path } => {
            let counts = commands::import_urls(&store, &path)?;
            counts.print();
        }
        Commands::ImportHtml { path } => {
            let (extracted, stored) = commands::import_listing_html(&store, &path, &settings.base_url)?;
            println!(
                "Imported listing HTML: extracted={} added_or_updated={}",
                extracted, stored
            );
        }
        Commands::ImportCourseHtml { path } => {
            let imported = commands::import_course_html(&store, &path, &settings.base_url)?;
            println!(
                "Imported course HTML: id={} url={} html_path={}",
                imported.id,
                imported.url,
                imported.html_path.display()
            );
        }
        Commands::QuickFreeList { path, fresh, output } => {
            let output = output.unwrap_or(settings.free_csv);
            let report =
                commands::quick_free_list(&store, &path, fresh, Some(&output), &settings.base_url)?;
            report.print();
        }
        Commands::Classify { target } => {
            let results = commands::classify_target(&store, target)?;
            if results.is_empty() {
                println!("No matching courses.");
            }
            for (record, verdict) in &results {
                println!(
                    "{:>4} | {:<16} | {} | {}",
                    record.id,
                    verdict.classification.as_str(),
                    record.url,
                    verdict.reason
                );
            }
        }
        Commands::List { status, class } => {
            let records = commands::list_records(&store, status, class)?;
            commands::print_records(&records);
        }
        Commands::OpenNext { only_free } => {
            let browser = SystemBrowser::new(settings.browser);
            match commands::open_next(&store, only_free, &browser)? {
                Some(record) => println!("Opened id={} url={}", record.id, record.url),
                None if only_free => println!("No pending TRULY_FREE courses."),
                None => println!("No pending courses."),
            }
        }
        Commands::MarkDone { id } => {
            commands::mark_done(&store, id)?;
            println!("Marked done: id={}", id);
        }
        Commands::Export { format, output } => match format {
            ExportFormat::Csv => {
                let output = output.unwrap_or(settings.export_csv);
                let n = commands::export_csv(&store, &output)?;
                println!("Exported {} rows to {}", n, output.display());
            }
        },
    }
    Ok(())
}
