mod client;
mod errors;
mod page;
mod query;
pub mod types;
mod user_agent;
pub use self::client::{probe_webdriver, BrowserOptions, WebDriverBrowser, WebDriverPage};
pub use self::errors::Error;
pub use self::page::{xpath_literal, Locator, PortalBrowser, PortalPage};
pub use self::query::{CallStatus, FilterState, Programme};
pub use self::user_agent::get_user_agent;
