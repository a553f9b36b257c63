//! The `categories` subcommand: list the categories a scrape can visit.

use anyhow::Result;
use clap::Args;
use fundingcalls_lib::{list_categories_for, validation, Db, ScraperConfig};

use crate::output::{print_categories, print_category_names, OutputFormat};

#[derive(Args)]
pub struct CategoriesArgs {
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

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// List categories registered by earlier scrapes instead of asking the portal
    #[arg(long)]
    pub stored: bool,
}

pub async fn run(args: &CategoriesArgs, mut config: ScraperConfig, format: &OutputFormat) -> Result<()> {
    if args.stored {
        let db = Db::open(&config.db_path)?;
        db.init()?;
        let categories = db.list_categories()?;
        return print_categories(&categories, format);
    }

    let keyword = args
        .keyword
        .as_deref()
        .map(validation::validate_keyword)
        .transpose()?;
    let filters = super::filter_state(args.forthcoming, args.open, args.closed, keyword.as_deref());
    if args.headed {
        config.headless = false;
    }

    eprintln!("Reading categories from {}", config.portal_url);
    let names = list_categories_for(config, &filters).await?;
    if names.is_empty() {
        eprintln!("The portal offered no categories for these filters");
    }
    print_category_names(&names, format)
}
