mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fundingcalls_lib::ScraperConfig;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "fundingcalls")]
#[command(about = "Scrape and query calls for proposals from the EU Funding & Tenders portal")]
struct Cli {
    /// Output format: table, json, csv or markdown
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape calls from the portal into the database
    Scrape(commands::scrape::ScrapeArgs),
    /// List the categories the portal offers for a set of filters
    Categories(commands::categories::CategoriesArgs),
    /// Query stored calls
    Calls(commands::calls::CallsArgs),
    /// Show or reset the scrape run status
    Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fundingcalls=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        "csv" => OutputFormat::Csv,
        "markdown" | "md" => OutputFormat::Markdown,
        _ => OutputFormat::Table,
    };

    let config = ScraperConfig::resolve(cli.config.as_deref())?;

    match &cli.command {
        Commands::Scrape(args) => commands::scrape::run(args, config, &format).await?,
        Commands::Categories(args) => commands::categories::run(args, config, &format).await?,
        Commands::Calls(args) => commands::calls::run(args, &config, &format)?,
        Commands::Status(args) => commands::status::run(args, &config, &format)?,
    }

    Ok(())
}
