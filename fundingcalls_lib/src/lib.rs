//! Library layer for the funding-calls scraper: portal workflow stages,
//! HTML parsers, record merging and SQLite persistence.
//!
//! Every stage takes an explicit page or browser handle from
//! `fundingcalls_portal`, so the whole pipeline runs the same against a
//! real WebDriver session or the in-memory portal in [`testing`].

pub mod categories;
pub mod category_select;
pub mod config;
pub mod db;
pub mod detail;
pub mod error;
pub mod filters;
pub mod harvest;
pub mod merge;
pub mod parse;
pub mod pipeline;
pub mod poll;
pub mod selectors;
pub mod session;
#[doc(hidden)]
pub mod testing;
pub mod validation;

pub use fundingcalls_portal;
pub use fundingcalls_portal::types;
pub use fundingcalls_portal::{CallStatus, FilterState, Programme};

pub use config::{ConfigError, DetailStrategy, ScraperConfig};
pub use db::{CallFilter, Db, DbError, RunState, RunStatus, StoredCall, UpsertSummary};
pub use error::ScrapeError;
pub use pipeline::{
    list_categories_for, run_scrape, spawn_scrape, CategoryOutcome, CategorySelection,
    PipelineStage, ProgressEvent, RunReport, ScrapeRequest,
};
pub use session::PortalSession;
