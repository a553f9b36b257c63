//! The browser seam: [`PortalPage`] and [`PortalBrowser`] traits plus the
//! [`Locator`] type used to address elements on a page.
//!
//! Every pipeline stage takes an explicit page or browser handle, so a real
//! WebDriver session and an in-memory fake can be swapped freely.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::Error;

/// How to find an element: a CSS selector or an XPath expression.
///
/// XPath is used wherever the portal has to be matched on visible text,
/// which CSS cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// A `<button>` carrying `class` whose normalized text contains `text`.
    pub fn button_with_text(class: &str, text: &str) -> Self {
        Self::XPath(format!(
            "//button[contains(concat(' ', normalize-space(@class), ' '), ' {} ')][contains(normalize-space(.), {})]",
            class,
            xpath_literal(text)
        ))
    }

    /// A `<button>` carrying `class` that wraps a `<span>` whose own text is exactly `text`.
    pub fn button_with_span_text(scope: &str, class: &str, text: &str) -> Self {
        Self::XPath(format!(
            "{}//button[contains(concat(' ', normalize-space(@class), ' '), ' {} ')][.//span[normalize-space(text())={}]]",
            scope,
            class,
            xpath_literal(text)
        ))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={}", s),
            Self::XPath(s) => write!(f, "xpath={}", s),
        }
    }
}

/// Quote `value` as an XPath 1.0 string literal.
///
/// XPath 1.0 has no escape syntax, so a value containing both quote kinds
/// is assembled with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// One browser tab the pipeline can drive.
#[async_trait]
pub trait PortalPage: Send + Sync {
    /// Navigate to `url` and wait for the document to load.
    async fn goto(&self, url: &str) -> Result<(), Error>;

    /// Wait until `locator` matches at least one element, or fail with
    /// [`Error::Timeout`].
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), Error>;

    /// Whether `locator` currently matches anything. Never waits.
    async fn exists(&self, locator: &Locator) -> Result<bool, Error>;

    /// Number of elements `locator` currently matches.
    async fn count(&self, locator: &Locator) -> Result<usize, Error>;

    /// Whether the first match is rendered and visible. Absent counts as not visible.
    async fn is_visible(&self, locator: &Locator) -> Result<bool, Error>;

    /// Checked state of the first matching checkbox.
    async fn is_checked(&self, locator: &Locator) -> Result<bool, Error>;

    /// Whether the first match carries the `disabled` state.
    async fn is_disabled(&self, locator: &Locator) -> Result<bool, Error>;

    async fn click(&self, locator: &Locator) -> Result<(), Error>;

    /// Clear the first matching input and type `text` into it.
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), Error>;

    /// Press Enter in the first matching input.
    async fn submit(&self, locator: &Locator) -> Result<(), Error>;

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), Error>;

    /// Scroll the first matching container vertically by `dy` pixels.
    async fn scroll_by(&self, container: &Locator, dy: i64) -> Result<(), Error>;

    async fn scroll_to_top(&self, container: &Locator) -> Result<(), Error>;

    /// Serialized DOM of the page as currently rendered.
    async fn content(&self) -> Result<String, Error>;
}

/// A browser process that hands out pages sharing one session.
#[async_trait]
pub trait PortalBrowser: Send + Sync {
    type Page: PortalPage;

    /// The page the session started with. Listing and pagination run here.
    async fn primary_page(&self) -> Result<Self::Page, Error>;

    /// Open an auxiliary page (a new tab) without disturbing the primary one.
    async fn open_page(&self) -> Result<Self::Page, Error>;

    /// Close an auxiliary page and return focus to the primary page.
    async fn close_page(&self, page: Self::Page) -> Result<(), Error>;

    /// End the browser session.
    async fn quit(&self) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_without_quotes_uses_single_quotes() {
        assert_eq!(xpath_literal("HORIZON-CL4"), "'HORIZON-CL4'");
    }

    #[test]
    fn literal_with_apostrophe_switches_to_double_quotes() {
        assert_eq!(xpath_literal("Europe's"), "\"Europe's\"");
    }

    #[test]
    fn literal_with_both_quote_kinds_uses_concat() {
        assert_eq!(
            xpath_literal(r#"a'b"c"#),
            r#"concat('a', "'", 'b"c')"#
        );
    }

    #[test]
    fn button_with_text_matches_class_token() {
        let locator = Locator::button_with_text("eui-button", "Call");
        let Locator::XPath(expr) = locator else {
            panic!("expected xpath locator");
        };
        assert!(expr.contains("' eui-button '"));
        assert!(expr.contains("'Call'"));
    }

    #[test]
    fn display_prefixes_kind() {
        assert_eq!(Locator::css("table.eui-table").to_string(), "css=table.eui-table");
    }
}
