//! Applying a [`FilterState`] to the search screen.

use fundingcalls_portal::{CallStatus, FilterState, PortalPage};

use crate::config::ScraperConfig;
use crate::error::{require, ScrapeError};
use crate::selectors;

/// Bring the portal's filters in line with `state`.
///
/// Every control is read before it is touched, so applying the same state
/// twice performs no clicks the second time. A control that never appears
/// fails with [`ScrapeError::UiElementNotFound`].
pub async fn apply_filters<P: PortalPage + ?Sized>(
    page: &P,
    state: &FilterState,
    config: &ScraperConfig,
) -> Result<(), ScrapeError> {
    if state.manages_statuses() {
        for status in CallStatus::ALL {
            set_status(page, status, state.desired(status), config).await?;
        }
    } else {
        tracing::debug!("No status filter requested, keeping portal defaults");
    }

    select_programme(page, state, config).await?;

    if let Some(keyword) = &state.keyword {
        let input = selectors::keyword_input();
        require(page, &input, config.element_timeout()).await?;
        page.fill(&input, keyword).await?;
        page.submit(&input).await?;
        tracing::info!("Keyword filter set to '{}'", keyword);
    }
    Ok(())
}

async fn set_status<P: PortalPage + ?Sized>(
    page: &P,
    status: CallStatus,
    desired: bool,
    config: &ScraperConfig,
) -> Result<(), ScrapeError> {
    let checkbox = selectors::status_checkbox(status);
    if !page.is_visible(&checkbox).await? {
        let toggle = selectors::status_toggle();
        require(page, &toggle, config.element_timeout()).await?;
        page.click(&toggle).await?;
    }
    require(page, &checkbox, config.element_timeout()).await?;

    let checked = page.is_checked(&checkbox).await?;
    if checked != desired {
        page.click(&checkbox).await?;
        tracing::info!(status = %status, checked = desired, "Status filter toggled");
    } else {
        tracing::debug!(status = %status, checked, "Status filter already in place");
    }
    Ok(())
}

async fn select_programme<P: PortalPage + ?Sized>(
    page: &P,
    state: &FilterState,
    config: &ScraperConfig,
) -> Result<(), ScrapeError> {
    let label = state.programme.label();
    if page.exists(&selectors::programme_chip(state.programme)).await? {
        tracing::debug!("Programme '{}' already selected", label);
        return Ok(());
    }
    let toggle = selectors::programme_toggle();
    require(page, &toggle, config.element_timeout()).await?;
    page.click(&toggle).await?;

    let option = selectors::programme_option(state.programme);
    require(page, &option, config.element_timeout()).await?;
    page.click(&option).await?;
    tracing::info!("Programme filter set to '{}'", label);
    Ok(())
}
