//! The `calls` subcommand: query calls stored by earlier scrapes.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use fundingcalls_lib::{validation, CallFilter, Db, ScraperConfig};

use crate::output::{print_calls, OutputFormat};

#[derive(Args)]
pub struct CallsArgs {
    /// SQLite database path (defaults to the configured database)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Substring of the identifier or title
    #[arg(long)]
    pub search: Option<String>,

    /// Card status: forthcoming, open, closed (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<String>,

    /// Probability of funding: low, medium, high, unknown
    #[arg(long)]
    pub probability: Option<String>,

    /// Category name or group (e.g. CL4)
    #[arg(long)]
    pub category: Option<String>,

    /// Maximum number of calls to show
    #[arg(long)]
    pub limit: Option<i64>,
}

pub fn run(args: &CallsArgs, config: &ScraperConfig, format: &OutputFormat) -> Result<()> {
    let filter = build_filter(args)?;

    let path = args.db.as_ref().unwrap_or(&config.db_path);
    let db = Db::open(path)?;
    db.init()?;

    let calls = db.query_calls(&filter)?;
    eprintln!("{} calls", calls.len());
    print_calls(&calls, format)
}

fn build_filter(args: &CallsArgs) -> Result<CallFilter> {
    let statuses = args
        .status
        .iter()
        .map(|s| validation::validate_status(s))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CallFilter {
        search: args
            .search
            .as_deref()
            .map(validation::validate_keyword)
            .transpose()?,
        statuses,
        probability: args
            .probability
            .as_deref()
            .map(validation::validate_probability)
            .transpose()?,
        category: args
            .category
            .as_deref()
            .map(validation::validate_category)
            .transpose()?,
        limit: args.limit.map(validation::validate_limit).transpose()?,
    })
}
