//! Reading budget data from a call's topic page in an auxiliary tab.

use fundingcalls_portal::types::{DetailRecord, Extracted};
use fundingcalls_portal::{PortalBrowser, PortalPage};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::parse::{parse_budget_table, parse_total_funding};
use crate::selectors;

/// Open `link` in a new page and read its budget table, falling back to the
/// "Total funding available" block. The page is closed on every path.
pub async fn fetch_details<B: PortalBrowser + ?Sized>(
    browser: &B,
    link: &Url,
    config: &ScraperConfig,
) -> Result<Vec<DetailRecord>, ScrapeError> {
    let page = browser.open_page().await?;
    let result = read_details(&page, link, config).await;
    if let Err(e) = browser.close_page(page).await {
        tracing::warn!("Failed to close detail page for {}: {}", link, e);
    }
    result
}

async fn read_details<P: PortalPage + ?Sized>(
    page: &P,
    link: &Url,
    config: &ScraperConfig,
) -> Result<Vec<DetailRecord>, ScrapeError> {
    page.goto(link.as_str()).await?;

    match page
        .wait_for(&selectors::budget_table(), config.element_timeout())
        .await
    {
        Ok(()) => {
            let html = page.content().await?;
            let rows = parse_budget_table(&html);
            if !rows.is_empty() {
                tracing::debug!(rows = rows.len(), %link, "Budget table read");
                return Ok(rows);
            }
            tracing::debug!(%link, "Budget table has no rows");
        }
        Err(e) if e.is_missing_element() => {
            tracing::info!(%link, "Budget table not found, trying total funding");
        }
        Err(e) => return Err(e.into()),
    }

    let html = page.content().await?;
    match parse_total_funding(&html) {
        Some(budget) => {
            tracing::info!(%link, budget = %budget, "Budget taken from total funding");
            Ok(vec![DetailRecord::fallback(Extracted::Found(budget))])
        }
        None => Err(ScrapeError::DetailFetchFailed {
            link: link.to_string(),
            reason: "no budget table or total funding block".to_string(),
        }),
    }
}
