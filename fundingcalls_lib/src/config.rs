//! Scraper configuration: defaults, optional TOML file, environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fundingcalls_portal::BrowserOptions;
use serde::{Deserialize, Serialize};

use crate::poll::ScrollPolicy;

pub const DEFAULT_PORTAL_URL: &str =
    "https://ec.europa.eu/info/funding-tenders/opportunities/portal/screen/opportunities/calls-for-proposals";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_DB_PATH: &str = "fundingcalls.db";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// How many detail pages to visit per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailStrategy {
    /// Visit the first card's detail page and cross-reference every card
    /// against its budget table.
    #[default]
    SampleFirst,
    /// Visit each card's own detail page.
    PerRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub portal_url: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub db_path: PathBuf,
    /// Bound on waiting for any single control to appear.
    pub element_timeout_ms: u64,
    /// Bound on waiting for a category chip's dismiss control.
    pub dismiss_timeout_ms: u64,
    /// Bound on waiting for the results to change after a page turn.
    pub settle_timeout_ms: u64,
    pub settle_poll_ms: u64,
    pub scroll: ScrollPolicy,
    pub detail_strategy: DetailStrategy,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            element_timeout_ms: 30_000,
            dismiss_timeout_ms: 5_000,
            settle_timeout_ms: 30_000,
            settle_poll_ms: 1_000,
            scroll: ScrollPolicy::default(),
            detail_strategy: DetailStrategy::default(),
        }
    }
}

impl ScraperConfig {
    /// Read a TOML file. Keys that are absent keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Defaults, overlaid with `path` when given, then the environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `FUNDINGCALLS_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("FUNDINGCALLS_PORTAL_URL") {
            self.portal_url = url;
        }
        if let Some(url) = lookup("FUNDINGCALLS_WEBDRIVER_URL") {
            self.webdriver_url = url;
        }
        if let Some(path) = lookup("FUNDINGCALLS_DB") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("FUNDINGCALLS_HEADLESS") {
            self.headless = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "FUNDINGCALLS_HEADLESS".to_string(),
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup("FUNDINGCALLS_ELEMENT_TIMEOUT_MS") {
            self.element_timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "FUNDINGCALLS_ELEMENT_TIMEOUT_MS".to_string(),
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn dismiss_timeout(&self) -> Duration {
        Duration::from_millis(self.dismiss_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn settle_poll(&self) -> Duration {
        Duration::from_millis(self.settle_poll_ms)
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            webdriver_url: self.webdriver_url.clone(),
            headless: self.headless,
            ..BrowserOptions::default()
        }
    }
}
