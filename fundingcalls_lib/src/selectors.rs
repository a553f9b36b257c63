//! Locators for the calls-for-proposals search screen and topic pages.
//!
//! Text-based matches are XPath; structural ones are CSS. The HTML parsers
//! in [`crate::parse`] use the matching CSS selectors on page source.

use fundingcalls_portal::{xpath_literal, CallStatus, Locator, Programme};

pub const PORTAL_ORIGIN: &str = "https://ec.europa.eu";

pub const DROPDOWN_CONTAINER_CSS: &str = "div.eui-u-overflow-auto";
pub const DROPDOWN_ITEM_CSS: &str = "button.eui-dropdown-item";
pub const DROPDOWN_LABEL_CSS: &str = "span.eui-u-pr-s";
pub const RESULT_CARD_CSS: &str = "sedia-result-card";
pub const CARD_LINK_CSS: &str = "a.eui-u-text-link.eui-u-font-l.eui-u-font-regular";
pub const CARD_IDENTIFIER_CSS: &str = "sedia-result-card-type span.ng-star-inserted";
pub const CARD_STATUS_CSS: &str = "eui-card-header-right-content eui-chip span.eui-label";
pub const BUDGET_TABLE_CSS: &str = "table.eui-table";
pub const TOTAL_FUNDING_VALUE_CSS: &str = "div.eui-u-font-m";
pub const TOTAL_FUNDING_LABEL: &str = "Total funding available";

pub fn status_toggle() -> Locator {
    Locator::button_with_text("eui-button", "Submission status")
}

pub fn status_checkbox(status: CallStatus) -> Locator {
    Locator::css(format!(
        "input.eui-input-checkbox[id='{}']",
        status.checkbox_id()
    ))
}

pub fn programme_toggle() -> Locator {
    Locator::xpath("//button[@data-e2e='eui-button'][contains(normalize-space(.), 'Programme')]")
}

pub fn programme_option(programme: Programme) -> Locator {
    Locator::button_with_text("eui-dropdown-item", programme.label())
}

/// The chip shown once a programme is part of the active filters.
pub fn programme_chip(programme: Programme) -> Locator {
    Locator::xpath(format!(
        "//eui-chip[contains(normalize-space(.), {})]",
        xpath_literal(programme.label())
    ))
}

pub fn keyword_input() -> Locator {
    Locator::css("input[formcontrolname='keywords']")
}

/// The "Call" selector button that opens the category dropdown.
pub fn call_selector() -> Locator {
    Locator::button_with_text("eui-button", "Call")
}

pub fn dropdown_container() -> Locator {
    Locator::css(DROPDOWN_CONTAINER_CSS)
}

/// The dropdown entry whose label is exactly `category`.
pub fn category_option(category: &str) -> Locator {
    Locator::button_with_span_text(
        "//div[contains(concat(' ', normalize-space(@class), ' '), ' eui-u-overflow-auto ')]",
        "eui-dropdown-item",
        category,
    )
}

/// The filter button that shows the currently selected category.
pub fn category_chip(category: &str) -> Locator {
    Locator::button_with_text("eui-button", category)
}

/// The "×" control that clears the selected category.
pub fn category_dismiss() -> Locator {
    Locator::css(
        "button.eui-button--basic.eui-button--icon-only[data-e2e=\"eui-button\"] eui-icon-svg[icon=\"eui-close\"]",
    )
}

pub fn result_cards() -> Locator {
    Locator::css(RESULT_CARD_CSS)
}

pub fn next_page_button() -> Locator {
    Locator::xpath(
        "//button[.//eui-icon-svg[@icon='eui-caret-right' and @aria-label='Go to next page']]",
    )
}

pub fn budget_table() -> Locator {
    Locator::css(BUDGET_TABLE_CSS)
}
