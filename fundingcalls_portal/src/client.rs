//! WebDriver-backed implementation of the browser seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thirtyfour::prelude::*;
use thirtyfour::WindowHandle;
use tokio::sync::Mutex;

use crate::{page::Locator, user_agent::get_user_agent, Error, PortalBrowser, PortalPage};

const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// Options for launching a WebDriver session.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Base URL of a running WebDriver server (chromedriver by default).
    pub webdriver_url: String,
    pub headless: bool,
    pub window_size: (u32, u32),
    /// Overrides the randomized desktop user agent.
    pub user_agent: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            window_size: (1920, 1080),
            user_agent: None,
        }
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    value: StatusValue,
}

#[derive(Deserialize)]
struct StatusValue {
    ready: bool,
    #[serde(default)]
    message: String,
}

/// Ask the WebDriver server at `webdriver_url` whether it can accept a new session.
pub async fn probe_webdriver(webdriver_url: &str) -> Result<(), Error> {
    let url = format!("{}/status", webdriver_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let resp = client.get(&url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::DriverUnavailable {
            url: webdriver_url.to_string(),
            reason: format!("status endpoint returned {}", status),
        });
    }
    let body: StatusResponse = resp.json().await?;
    if !body.value.ready {
        return Err(Error::DriverUnavailable {
            url: webdriver_url.to_string(),
            reason: body.value.message,
        });
    }
    Ok(())
}

fn by(locator: &Locator) -> By {
    match locator {
        Locator::Css(s) => By::Css(s.as_str()),
        Locator::XPath(s) => By::XPath(s.as_str()),
    }
}

/// A Chrome session driven over the WebDriver protocol.
///
/// WebDriver commands always act on the focused window, so every page
/// operation takes the shared focus lock and switches to its own window
/// first. The primary page and auxiliary detail pages can then be used
/// from the same task without stepping on each other.
pub struct WebDriverBrowser {
    driver: WebDriver,
    primary: WindowHandle,
    focus: Arc<Mutex<WindowHandle>>,
}

impl WebDriverBrowser {
    /// Probes the server, then starts a Chrome session with the given options.
    pub async fn launch(options: &BrowserOptions) -> Result<Self, Error> {
        probe_webdriver(&options.webdriver_url).await?;

        let mut caps = DesiredCapabilities::chrome();
        if options.headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_arg(&format!(
            "--window-size={},{}",
            options.window_size.0, options.window_size.1
        ))?;
        let agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| get_user_agent().to_string());
        caps.add_arg(&format!("--user-agent={}", agent))?;

        let driver = WebDriver::new(&options.webdriver_url, caps).await?;
        let primary = match driver.window().await {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(quit_err) = driver.quit().await {
                    tracing::warn!("Failed to quit browser after launch error: {}", quit_err);
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            "Browser session started via {} (headless: {})",
            options.webdriver_url,
            options.headless
        );
        Ok(Self {
            driver,
            focus: Arc::new(Mutex::new(primary.clone())),
            primary,
        })
    }

    fn page_for(&self, handle: WindowHandle) -> WebDriverPage {
        WebDriverPage {
            driver: self.driver.clone(),
            handle,
            focus: Arc::clone(&self.focus),
        }
    }
}

#[async_trait]
impl PortalBrowser for WebDriverBrowser {
    type Page = WebDriverPage;

    async fn primary_page(&self) -> Result<WebDriverPage, Error> {
        Ok(self.page_for(self.primary.clone()))
    }

    async fn open_page(&self) -> Result<WebDriverPage, Error> {
        let mut focused = self.focus.lock().await;
        let handle = self.driver.new_tab().await?;
        self.driver.switch_to_window(handle.clone()).await?;
        *focused = handle.clone();
        tracing::debug!("Opened auxiliary page {:?}", handle);
        Ok(self.page_for(handle))
    }

    async fn close_page(&self, page: WebDriverPage) -> Result<(), Error> {
        if page.handle == self.primary {
            return Ok(());
        }
        let mut focused = self.focus.lock().await;
        if *focused != page.handle {
            self.driver.switch_to_window(page.handle.clone()).await?;
        }
        self.driver.close_window().await?;
        self.driver.switch_to_window(self.primary.clone()).await?;
        *focused = self.primary.clone();
        Ok(())
    }

    async fn quit(&self) -> Result<(), Error> {
        self.driver.clone().quit().await?;
        tracing::info!("Browser session closed");
        Ok(())
    }
}

/// Only "nothing matched before the deadline" becomes [`Error::Timeout`];
/// a dead session or transport failure stays a WebDriver error.
fn wait_error(err: WebDriverError, locator: &Locator, timeout: Duration) -> Error {
    match err {
        WebDriverError::NoSuchElement(_) => Error::Timeout {
            locator: locator.to_string(),
            timeout_ms: timeout.as_millis(),
        },
        other => Error::WebDriver(other),
    }
}

/// One window of a [`WebDriverBrowser`].
pub struct WebDriverPage {
    driver: WebDriver,
    handle: WindowHandle,
    focus: Arc<Mutex<WindowHandle>>,
}

impl WebDriverPage {
    async fn focused(&self) -> Result<tokio::sync::MutexGuard<'_, WindowHandle>, Error> {
        let mut focused = self.focus.lock().await;
        if *focused != self.handle {
            self.driver.switch_to_window(self.handle.clone()).await?;
            *focused = self.handle.clone();
        }
        Ok(focused)
    }

    async fn first(&self, locator: &Locator) -> Result<WebElement, Error> {
        let mut found = self.driver.find_all(by(locator)).await?;
        if found.is_empty() {
            return Err(Error::ElementNotFound {
                locator: locator.to_string(),
            });
        }
        Ok(found.swap_remove(0))
    }
}

#[async_trait]
impl PortalPage for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<(), Error> {
        let _focus = self.focused().await?;
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), Error> {
        let _focus = self.focused().await?;
        self.driver
            .query(by(locator))
            .wait(timeout, ELEMENT_POLL)
            .first()
            .await
            .map(|_| ())
            .map_err(|e| wait_error(e, locator, timeout))
    }

    async fn exists(&self, locator: &Locator) -> Result<bool, Error> {
        Ok(self.count(locator).await? > 0)
    }

    async fn count(&self, locator: &Locator) -> Result<usize, Error> {
        let _focus = self.focused().await?;
        Ok(self.driver.find_all(by(locator)).await?.len())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, Error> {
        let _focus = self.focused().await?;
        match self.driver.find_all(by(locator)).await?.first() {
            Some(elem) => Ok(elem.is_displayed().await?),
            None => Ok(false),
        }
    }

    async fn is_checked(&self, locator: &Locator) -> Result<bool, Error> {
        let _focus = self.focused().await?;
        Ok(self.first(locator).await?.is_selected().await?)
    }

    async fn is_disabled(&self, locator: &Locator) -> Result<bool, Error> {
        let _focus = self.focused().await?;
        Ok(!self.first(locator).await?.is_enabled().await?)
    }

    async fn click(&self, locator: &Locator) -> Result<(), Error> {
        let _focus = self.focused().await?;
        let elem = self.first(locator).await?;
        if let Err(e) = elem.click().await {
            // Overlays on the portal intercept native clicks; a script click still lands.
            tracing::debug!("Native click on {} failed ({}), using script click", locator, e);
            self.driver
                .execute("arguments[0].click();", vec![elem.to_json()?])
                .await?;
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), Error> {
        let _focus = self.focused().await?;
        let elem = self.first(locator).await?;
        elem.clear().await?;
        elem.send_keys(text).await?;
        Ok(())
    }

    async fn submit(&self, locator: &Locator) -> Result<(), Error> {
        let _focus = self.focused().await?;
        self.first(locator).await?.send_keys(Key::Enter).await?;
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), Error> {
        let _focus = self.focused().await?;
        self.first(locator).await?.scroll_into_view().await?;
        Ok(())
    }

    async fn scroll_by(&self, container: &Locator, dy: i64) -> Result<(), Error> {
        let _focus = self.focused().await?;
        let elem = self.first(container).await?;
        self.driver
            .execute(
                "arguments[0].scrollBy(0, arguments[1]);",
                vec![elem.to_json()?, serde_json::Value::from(dy)],
            )
            .await?;
        Ok(())
    }

    async fn scroll_to_top(&self, container: &Locator) -> Result<(), Error> {
        let _focus = self.focused().await?;
        let elem = self.first(container).await?;
        self.driver
            .execute("arguments[0].scrollTop = 0;", vec![elem.to_json()?])
            .await?;
        Ok(())
    }

    async fn content(&self) -> Result<String, Error> {
        let _focus = self.focused().await?;
        Ok(self.driver.source().await?)
    }
}
