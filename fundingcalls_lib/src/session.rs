use fundingcalls_portal::{PortalBrowser, WebDriverBrowser};
use url::Url;

use crate::config::{ConfigError, ScraperConfig};
use crate::error::ScrapeError;

/// A browser, its primary page and the configuration driving them.
///
/// Passed explicitly to every pipeline stage.
pub struct PortalSession<B: PortalBrowser> {
    browser: B,
    page: B::Page,
    config: ScraperConfig,
    origin: Url,
}

impl<B: PortalBrowser> PortalSession<B> {
    /// Wrap an already running browser.
    pub async fn attach(browser: B, config: ScraperConfig) -> Result<Self, ScrapeError> {
        let origin = portal_origin(&config)?;
        let page = browser.primary_page().await?;
        Ok(Self {
            browser,
            page,
            config,
            origin,
        })
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn page(&self) -> &B::Page {
        &self.page
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Scheme and host of the portal; card links are resolved against it.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub async fn close(self) -> Result<(), ScrapeError> {
        self.browser.quit().await?;
        Ok(())
    }
}

impl PortalSession<WebDriverBrowser> {
    /// Start a WebDriver browser as configured and attach to it.
    pub async fn launch(config: ScraperConfig) -> Result<Self, ScrapeError> {
        portal_origin(&config)?;
        let browser = WebDriverBrowser::launch(&config.browser_options()).await?;
        Self::attach(browser, config).await
    }
}

fn portal_origin(config: &ScraperConfig) -> Result<Url, ConfigError> {
    Url::parse(&config.portal_url)
        .and_then(|url| url.join("/"))
        .map_err(|e| ConfigError::InvalidValue {
            key: "portal_url".to_string(),
            value: format!("{} ({})", config.portal_url, e),
        })
}
