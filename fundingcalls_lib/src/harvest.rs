//! Harvesting every result page of the selected category.

use fundingcalls_portal::types::SummaryRecord;
use fundingcalls_portal::PortalPage;
use url::Url;

use crate::config::ScraperConfig;
use crate::error::{require, ScrapeError};
use crate::parse::{parse_card_identifiers, parse_result_cards};
use crate::poll;
use crate::selectors;

/// Cards collected from all result pages of one category.
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub summaries: Vec<SummaryRecord>,
    /// Detail link of the first card on the first page.
    pub first_detail_link: Option<Url>,
    pub pages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HarvestState {
    Settle,
    AwaitCards,
    ParseCards,
    CheckNextButton,
    ClickNext,
    Done,
}

/// Walk the result pages until the next-page button is missing or disabled.
///
/// `stale_ids` are the card identifiers shown just before the category
/// option was clicked; harvesting starts once the page shows something
/// else, or once the settle timeout expires. Cards that fail to appear on a
/// later page end the harvest with an error rather than a partial result.
pub async fn harvest_category<P: PortalPage + ?Sized>(
    page: &P,
    config: &ScraperConfig,
    origin: &Url,
    stale_ids: &[String],
) -> Result<Harvest, ScrapeError> {
    let cards = selectors::result_cards();
    let next = selectors::next_page_button();
    let mut harvest = Harvest::default();
    let mut previous_ids = stale_ids.to_vec();
    let mut state = HarvestState::Settle;

    loop {
        tracing::trace!(?state, page = harvest.pages + 1, "Harvest step");
        state = match state {
            HarvestState::Settle => {
                settle(page, &previous_ids, config).await?;
                HarvestState::AwaitCards
            }
            HarvestState::AwaitCards => {
                match require(page, &cards, config.element_timeout()).await {
                    Ok(()) => HarvestState::ParseCards,
                    Err(ScrapeError::UiElementNotFound { .. }) if harvest.pages == 0 => {
                        tracing::warn!("No result cards shown for this category");
                        HarvestState::Done
                    }
                    // Past the first page the next button promised more cards.
                    Err(e) => return Err(e),
                }
            }
            HarvestState::ParseCards => {
                let html = page.content().await?;
                let parsed = parse_result_cards(&html, origin);
                harvest.pages += 1;
                if harvest.pages == 1 {
                    harvest.first_detail_link =
                        parsed.first().and_then(|card| card.detail_link.clone());
                }
                tracing::debug!(
                    page = harvest.pages,
                    cards = parsed.len(),
                    "Parsed result page"
                );
                previous_ids = parse_card_identifiers(&html);
                harvest.summaries.extend(parsed);
                HarvestState::CheckNextButton
            }
            HarvestState::CheckNextButton => {
                if !page.exists(&next).await? {
                    tracing::debug!("No next-page button, pagination finished");
                    HarvestState::Done
                } else if page.is_disabled(&next).await? {
                    tracing::debug!("Next-page button disabled, pagination finished");
                    HarvestState::Done
                } else {
                    HarvestState::ClickNext
                }
            }
            HarvestState::ClickNext => {
                page.click(&next).await?;
                HarvestState::Settle
            }
            HarvestState::Done => break,
        };
    }

    tracing::info!(
        pages = harvest.pages,
        cards = harvest.summaries.len(),
        "Harvest finished"
    );
    Ok(harvest)
}

/// Wait for the shown cards to differ from `previous`.
async fn settle<P: PortalPage + ?Sized>(
    page: &P,
    previous: &[String],
    config: &ScraperConfig,
) -> Result<(), ScrapeError> {
    let changed = poll::wait_until(
        config.settle_timeout(),
        config.settle_poll(),
        move || async move {
            let html = page.content().await?;
            let ids = parse_card_identifiers(&html);
            Ok::<bool, ScrapeError>(!ids.is_empty() && ids.as_slice() != previous)
        },
    )
    .await?;
    if !changed {
        tracing::warn!(
            "Results did not change within {:?}, harvesting anyway",
            config.settle_timeout()
        );
    }
    Ok(())
}
