//! Error types for the browser session layer.

/// Errors that can occur while driving a portal page.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The WebDriver protocol returned an error (navigation, script, window handling).
    #[error("webdriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),
    /// A locator matched nothing at the moment it was used.
    #[error("element not found: {locator}")]
    ElementNotFound { locator: String },
    /// A bounded wait for a locator expired.
    #[error("timed out after {timeout_ms}ms waiting for {locator}")]
    Timeout { locator: String, timeout_ms: u128 },
    /// The WebDriver server did not report itself ready.
    #[error("webdriver at {url} is not ready: {reason}")]
    DriverUnavailable { url: String, reason: String },
    /// The readiness probe could not reach the WebDriver server.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The page handle was used after it had been closed.
    #[error("page {0} is closed")]
    PageClosed(String),
}

impl Error {
    /// True when the error means "the element never showed up", as opposed
    /// to a transport or protocol failure.
    pub fn is_missing_element(&self) -> bool {
        matches!(self, Self::ElementNotFound { .. } | Self::Timeout { .. })
    }
}
