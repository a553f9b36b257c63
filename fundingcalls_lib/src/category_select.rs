//! Selecting a category, clearing the previous one first.

use fundingcalls_portal::PortalPage;

use crate::categories::open_call_selector;
use crate::config::ScraperConfig;
use crate::error::{require, ScrapeError};
use crate::parse::parse_card_identifiers;
use crate::poll;
use crate::selectors;

fn skipped(category: &str, reason: impl Into<String>) -> ScrapeError {
    ScrapeError::CategorySkipped {
        category: category.to_string(),
        reason: reason.into(),
    }
}

/// Make `category` the active category filter.
///
/// `active` is the category currently applied on the page; it is cleared
/// through its chip's dismiss control before the new one is picked, and
/// updated on success. Failures to find the dismiss control or the target
/// option are reported as [`ScrapeError::CategorySkipped`].
///
/// Returns the card identifiers shown just before the option was clicked,
/// which is the page the results have to move away from.
pub async fn select_category<P: PortalPage + ?Sized>(
    page: &P,
    category: &str,
    active: &mut Option<String>,
    config: &ScraperConfig,
) -> Result<Vec<String>, ScrapeError> {
    if let Some(previous) = active.clone() {
        match clear_category(page, category, &previous, config).await {
            Ok(()) => *active = None,
            Err(e @ ScrapeError::CategorySkipped { .. }) => {
                tracing::warn!(
                    previous = %previous,
                    "Previous category is still applied, later categories are skipped until it clears"
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        }
    }

    open_call_selector(page, config)
        .await
        .map_err(|e| match e {
            ScrapeError::UiElementNotFound { locator } => {
                skipped(category, format!("call selector unavailable ({})", locator))
            }
            other => other,
        })?;
    let container = selectors::dropdown_container();
    page.scroll_to_top(&container).await?;

    let option = selectors::category_option(category);
    let option_ref = &option;
    let container_ref = &container;
    let step = config.scroll.step_px;
    let visible = poll::poll_until(
        &config.scroll,
        move || async move {
            let shown = page.is_visible(option_ref).await?;
            Ok::<Option<()>, ScrapeError>(shown.then_some(()))
        },
        move || async move {
            page.scroll_by(container_ref, step).await?;
            Ok::<(), ScrapeError>(())
        },
    )
    .await?;

    if visible.is_none() {
        return Err(skipped(
            category,
            format!(
                "option not visible after {} scroll attempts",
                config.scroll.max_attempts
            ),
        ));
    }

    page.scroll_into_view(&option).await?;
    let shown = parse_card_identifiers(&page.content().await?);
    page.click(&option).await?;
    *active = Some(category.to_string());
    tracing::info!(category, "Category selected");
    Ok(shown)
}

async fn clear_category<P: PortalPage + ?Sized>(
    page: &P,
    category: &str,
    previous: &str,
    config: &ScraperConfig,
) -> Result<(), ScrapeError> {
    let chip = selectors::category_chip(previous);
    match require(page, &chip, config.element_timeout()).await {
        Ok(()) => {}
        Err(ScrapeError::UiElementNotFound { .. }) => {
            tracing::debug!(previous, "No chip for previous category, nothing to clear");
            return Ok(());
        }
        Err(e) => return Err(e),
    }
    page.click(&chip).await?;

    let dismiss = selectors::category_dismiss();
    match require(page, &dismiss, config.dismiss_timeout()).await {
        Ok(()) => {}
        Err(ScrapeError::UiElementNotFound { .. }) => {
            return Err(skipped(
                category,
                format!("dismiss control for '{}' not found", previous),
            ))
        }
        Err(e) => return Err(e),
    }
    page.scroll_into_view(&dismiss).await?;
    page.click(&dismiss).await?;
    tracing::debug!(previous, "Previous category cleared");
    Ok(())
}
