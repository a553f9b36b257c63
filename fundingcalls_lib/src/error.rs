//! Error types for the scraping pipeline.

use std::time::Duration;

use fundingcalls_portal::{Locator, PortalPage};

use crate::config::ConfigError;
use crate::db::DbError;

/// Errors produced by the pipeline stages.
///
/// `UiElementNotFound` during filter application or category enumeration
/// fails the run. `CategorySkipped` and `DetailFetchFailed` are scoped to a
/// single category and the run carries on.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("ui element not found: {locator}")]
    UiElementNotFound { locator: String },
    #[error("category '{category}' skipped: {reason}")]
    CategorySkipped { category: String, reason: String },
    #[error("detail page {link} yielded no data: {reason}")]
    DetailFetchFailed { link: String, reason: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("scrape run {run_id} is already in progress")]
    RunInProgress { run_id: String },
    #[error("browser error: {0}")]
    Browser(#[from] fundingcalls_portal::Error),
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl ScrapeError {
    /// Whether the run can continue with the next category.
    pub fn is_category_scoped(&self) -> bool {
        matches!(
            self,
            Self::CategorySkipped { .. } | Self::DetailFetchFailed { .. }
        )
    }
}

/// Wait for `locator` within `timeout`, mapping a miss to
/// [`ScrapeError::UiElementNotFound`].
pub async fn require<P: PortalPage + ?Sized>(
    page: &P,
    locator: &Locator,
    timeout: Duration,
) -> Result<(), ScrapeError> {
    match page.wait_for(locator, timeout).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_missing_element() => {
            tracing::warn!("Required element missing: {}", locator);
            Err(ScrapeError::UiElementNotFound {
                locator: locator.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}
