//! Enumerating the categories offered by the "Call" dropdown.

use std::collections::HashSet;
use std::sync::Mutex;

use fundingcalls_portal::PortalPage;

use crate::config::ScraperConfig;
use crate::error::{require, ScrapeError};
use crate::parse::parse_category_labels;
use crate::poll;
use crate::selectors;

/// Open the "Call" dropdown unless it is already showing.
pub async fn open_call_selector<P: PortalPage + ?Sized>(
    page: &P,
    config: &ScraperConfig,
) -> Result<(), ScrapeError> {
    let container = selectors::dropdown_container();
    if page.is_visible(&container).await? {
        return Ok(());
    }
    let button = selectors::call_selector();
    require(page, &button, config.element_timeout()).await?;
    page.click(&button).await?;
    require(page, &container, config.element_timeout()).await
}

/// Labels seen so far, in first-seen order.
#[derive(Default)]
struct LabelSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl LabelSet {
    fn extend(&mut self, labels: Vec<String>) {
        for label in labels {
            if self.seen.insert(label.clone()) {
                self.ordered.push(label);
            }
        }
    }
}

/// Every category label in the dropdown.
///
/// The dropdown only renders options near its scroll position, so labels
/// are collected from each rendered window while scrolling down until a
/// scroll step turns up nothing new.
pub async fn list_categories<P: PortalPage + ?Sized>(
    page: &P,
    config: &ScraperConfig,
) -> Result<Vec<String>, ScrapeError> {
    open_call_selector(page, config).await?;
    let container = selectors::dropdown_container();
    page.scroll_to_top(&container).await?;

    let labels = Mutex::new(LabelSet::default());
    let labels_ref = &labels;
    let container_ref = &container;
    let step = config.scroll.step_px;

    let outcome = poll::stabilize(
        &config.scroll,
        move || async move {
            let html = page.content().await?;
            let found = parse_category_labels(&html);
            let mut set = labels_ref.lock().unwrap_or_else(|e| e.into_inner());
            set.extend(found);
            Ok::<usize, ScrapeError>(set.ordered.len())
        },
        move || async move {
            page.scroll_by(container_ref, step).await?;
            Ok::<(), ScrapeError>(())
        },
    )
    .await?;

    if !outcome.converged {
        tracing::warn!(
            "Category list still growing after {} scroll attempts",
            outcome.attempts
        );
    }

    let labels = labels
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
        .ordered;
    if labels.is_empty() {
        tracing::warn!("No categories found in the Call dropdown");
    } else {
        tracing::info!("Found {} categories", labels.len());
    }
    Ok(labels)
}
