//! The `scrape` subcommand: drive the portal and store what it shows.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use fundingcalls_lib::{
    spawn_scrape, validation, CategoryOutcome, CategorySelection, Db, DetailStrategy,
    ProgressEvent, ScrapeRequest, ScraperConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::output::{print_report, OutputFormat};

/// Arguments for the `scrape` subcommand.
#[derive(Args)]
pub struct ScrapeArgs {
    /// Category to scrape; repeat for several. `all` (or `0`) scrapes every category
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Include forthcoming calls
    #[arg(long)]
    pub forthcoming: bool,

    /// Include calls open for submission
    #[arg(long)]
    pub open: bool,

    /// Include closed calls
    #[arg(long)]
    pub closed: bool,

    /// Free-text keyword applied before listing
    #[arg(long)]
    pub keyword: Option<String>,

    /// Visit every call's topic page instead of one sample page per category (slow)
    #[arg(long)]
    pub per_record_details: bool,

    /// SQLite database path (defaults to the configured database)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,
}

pub async fn run(args: &ScrapeArgs, mut config: ScraperConfig, format: &OutputFormat) -> Result<()> {
    let keyword = args
        .keyword
        .as_deref()
        .map(validation::validate_keyword)
        .transpose()?;
    let categories = args
        .categories
        .iter()
        .map(|c| validation::validate_category(c))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(ref db) = args.db {
        config.db_path = db.clone();
    }
    if args.per_record_details {
        config.detail_strategy = DetailStrategy::PerRecord;
    }
    if args.headed {
        config.headless = false;
    }

    {
        let db = Db::open(&config.db_path)?;
        db.init()?;
        let status = db.run_status()?;
        if status.is_running() {
            bail!(
                "a scrape is already running (run {}, started {}); use `fundingcalls status --reset` if it crashed",
                status.run_id.unwrap_or_default(),
                status
                    .started_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "at an unknown time".to_string())
            );
        }
    }

    let request = ScrapeRequest {
        filters: super::filter_state(args.forthcoming, args.open, args.closed, keyword.as_deref()),
        categories: CategorySelection::from_args(&categories),
    };
    eprintln!("Starting scrape into {}", config.db_path.display());

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_scrape(config, request, Some(tx));
    track_progress(rx).await;
    let report = handle.await??;

    eprintln!(
        "Scrape complete: {} calls stored across {} categories ({} not persisted)",
        report.stored(),
        report.categories.len(),
        report.skipped_categories()
    );
    print_report(&report, format)
}

/// Drive a progress bar from pipeline events until the run drops its sender.
async fn track_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let pb = ProgressBar::new_spinner();
    pb.set_message("applying filters...");

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::CategoriesResolved { total } => {
                pb.set_length(total as u64);
                pb.set_style(
                    ProgressStyle::with_template(
                        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
            }
            ProgressEvent::Stage { stage, category } => match category {
                Some(category) => pb.set_message(format!("{}: {}", category, stage)),
                None => pb.set_message(stage.to_string()),
            },
            ProgressEvent::CategoryFinished { category, outcome } => {
                match &outcome {
                    CategoryOutcome::Persisted { stored, .. } => {
                        pb.println(format!("{}: {} calls stored", category, stored))
                    }
                    CategoryOutcome::Skipped { reason } => {
                        pb.println(format!("{}: skipped ({})", category, reason))
                    }
                    CategoryOutcome::Failed { reason } => {
                        pb.println(format!("{}: failed ({})", category, reason))
                    }
                }
                pb.inc(1);
            }
        }
    }
    pb.finish_and_clear();
}

