//! The `status` subcommand: show or reset the scrape run status.

use anyhow::Result;
use clap::Args;
use fundingcalls_lib::{Db, ScraperConfig};

use crate::output::{print_status, OutputFormat};

#[derive(Args)]
pub struct StatusArgs {
    /// SQLite database path (defaults to the configured database)
    #[arg(long)]
    pub db: Option<std::path::PathBuf>,

    /// Mark the run status idle, e.g. after a crashed run
    #[arg(long)]
    pub reset: bool,
}

pub fn run(args: &StatusArgs, config: &ScraperConfig, format: &OutputFormat) -> Result<()> {
    let path = args.db.as_ref().unwrap_or(&config.db_path);
    let db = Db::open(path)?;
    db.init()?;

    if args.reset {
        db.reset_run_status()?;
        eprintln!("Run status reset");
    }

    let status = db.run_status()?;
    print_status(&status, format)?;

    if let Some(last) = db.get_meta("last_successful_run")? {
        eprintln!("Last successful run: {}", last);
    }
    Ok(())
}
