//! An in-memory stand-in for the portal, used by unit and integration tests.
//!
//! [`FakePortal`] implements [`PortalBrowser`] and hands out [`FakePage`]s
//! that understand the locators in [`crate::selectors`]. It models the
//! status checkboxes, the programme dropdown, the virtualized "Call"
//! dropdown, category chips with their dismiss control, paginated result
//! cards and topic pages opened in auxiliary tabs. Page source is rendered
//! with the same markup the parsers expect from the live portal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fundingcalls_portal::{
    CallStatus, Error, Locator, PortalBrowser, PortalPage, Programme,
};

use crate::config::ScraperConfig;
use crate::poll::ScrollPolicy;
use crate::selectors;

pub const FAKE_PORTAL_URL: &str = "https://portal.test/screen/opportunities/calls-for-proposals";
pub const FAKE_ORIGIN: &str = "https://portal.test";

/// Pixel height of one dropdown option.
pub const OPTION_HEIGHT_PX: i64 = 50;

const PRIMARY: u64 = 0;

/// A configuration with short waits, pointed at the fake portal.
pub fn fast_config() -> ScraperConfig {
    ScraperConfig {
        portal_url: FAKE_PORTAL_URL.to_string(),
        element_timeout_ms: 50,
        dismiss_timeout_ms: 20,
        settle_timeout_ms: 100,
        settle_poll_ms: 5,
        scroll: ScrollPolicy {
            step_px: 200,
            interval_ms: 1,
            max_attempts: 25,
        },
        ..ScraperConfig::default()
    }
}

/// One result card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCard {
    pub identifier: Option<String>,
    pub title: String,
    pub status: Option<String>,
    /// Link as written in the card, usually relative to the portal origin.
    pub link: Option<String>,
}

impl FakeCard {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            title: format!("Topic {}", identifier),
            status: Some(CallStatus::Open.label().to_string()),
            link: Some(Self::link_for(identifier)),
        }
    }

    /// The relative topic link [`FakeCard::new`] assigns.
    pub fn link_for(identifier: &str) -> String {
        format!("/topic-details/{}", identifier.to_lowercase())
    }

    /// Absolute form of [`FakeCard::link_for`].
    pub fn url_for(identifier: &str) -> String {
        format!("{}{}", FAKE_ORIGIN, Self::link_for(identifier))
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn without_status(mut self) -> Self {
        self.status = None;
        self
    }

    pub fn without_identifier(mut self) -> Self {
        self.identifier = None;
        self
    }

    pub fn without_link(mut self) -> Self {
        self.link = None;
        self
    }
}

/// Interactions recorded by the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    StatusToggled(CallStatus, bool),
    ProgrammeSelected,
    KeywordSubmitted(String),
    CallMenuOpened,
    Selected(String),
    ChipOpened(String),
    Dismissed(String),
    NextPage(usize),
    Navigated(String),
}

#[derive(Debug, Default)]
struct FakeState {
    checked: HashMap<CallStatus, bool>,
    status_panel_open: bool,
    programme_selected: bool,
    programme_menu_open: bool,
    keyword_text: String,
    keyword: Option<String>,

    categories: Vec<String>,
    window: Option<usize>,
    scroll_px: i64,
    call_menu_open: bool,
    selected: Option<String>,
    chip_open: bool,
    dismiss_missing: HashSet<String>,
    hidden: HashSet<Locator>,

    initial_results: Vec<Vec<FakeCard>>,
    results: HashMap<String, Vec<Vec<FakeCard>>>,
    current_page: usize,
    render_lag: usize,
    lagging: Option<(Vec<FakeCard>, usize)>,

    details: HashMap<String, String>,
    aux: BTreeMap<u64, Option<String>>,
    next_page_id: u64,
    opened: usize,
    closed: usize,
    quit: bool,

    events: Vec<FakeEvent>,
    clicks: usize,
}

/// What a locator points at on the fake portal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    StatusToggle,
    StatusCheckbox(CallStatus),
    ProgrammeToggle,
    ProgrammeOption,
    ProgrammeChip,
    KeywordInput,
    CallSelector,
    DropdownContainer,
    CategoryOption(String),
    CategoryChip(String),
    CategoryDismiss,
    ResultCards,
    NextPage,
    BudgetTable,
    Unknown,
}

impl FakeState {
    fn resolve(&self, locator: &Locator) -> Target {
        if self.hidden.contains(locator) {
            return Target::Unknown;
        }
        let programme = Programme::default();
        let fixed = [
            (selectors::status_toggle(), Target::StatusToggle),
            (selectors::programme_toggle(), Target::ProgrammeToggle),
            (selectors::programme_option(programme), Target::ProgrammeOption),
            (selectors::programme_chip(programme), Target::ProgrammeChip),
            (selectors::keyword_input(), Target::KeywordInput),
            (selectors::call_selector(), Target::CallSelector),
            (selectors::dropdown_container(), Target::DropdownContainer),
            (selectors::category_dismiss(), Target::CategoryDismiss),
            (selectors::result_cards(), Target::ResultCards),
            (selectors::next_page_button(), Target::NextPage),
            (selectors::budget_table(), Target::BudgetTable),
        ];
        if let Some((_, target)) = fixed.into_iter().find(|(l, _)| l == locator) {
            return target;
        }
        if let Some(status) = CallStatus::ALL
            .into_iter()
            .find(|s| selectors::status_checkbox(*s) == *locator)
        {
            return Target::StatusCheckbox(status);
        }
        for name in &self.categories {
            if selectors::category_option(name) == *locator {
                return Target::CategoryOption(name.clone());
            }
            if selectors::category_chip(name) == *locator {
                return Target::CategoryChip(name.clone());
            }
        }
        Target::Unknown
    }

    fn rendered_categories(&self) -> &[String] {
        let len = self.categories.len();
        let window = self.window.unwrap_or(len).min(len);
        let first = ((self.scroll_px / OPTION_HEIGHT_PX) as usize).min(len - window);
        &self.categories[first..first + window]
    }

    fn max_scroll(&self) -> i64 {
        let len = self.categories.len();
        let window = self.window.unwrap_or(len).min(len);
        (len - window) as i64 * OPTION_HEIGHT_PX
    }

    fn result_pages(&self) -> &[Vec<FakeCard>] {
        match &self.selected {
            Some(category) => self
                .results
                .get(category)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            None => &self.initial_results,
        }
    }

    fn shown_cards(&self) -> &[FakeCard] {
        self.result_pages()
            .get(self.current_page)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn aux_html(&self, page: u64) -> Result<Option<&str>, Error> {
        match self.aux.get(&page) {
            None => Err(Error::PageClosed(format!("aux-{}", page))),
            Some(url) => Ok(url
                .as_ref()
                .and_then(|u| self.details.get(u))
                .map(String::as_str)),
        }
    }

    fn present(&self, page: u64, target: &Target) -> Result<bool, Error> {
        if page != PRIMARY {
            let html = self.aux_html(page)?;
            return Ok(*target == Target::BudgetTable
                && html.is_some_and(|h| h.contains("eui-table")));
        }
        Ok(match target {
            Target::StatusToggle
            | Target::ProgrammeToggle
            | Target::KeywordInput
            | Target::CallSelector => true,
            Target::StatusCheckbox(_) => self.status_panel_open,
            Target::ProgrammeOption => self.programme_menu_open,
            Target::ProgrammeChip => self.programme_selected,
            Target::DropdownContainer => self.call_menu_open,
            Target::CategoryOption(name) => {
                self.call_menu_open && self.rendered_categories().contains(name)
            }
            Target::CategoryChip(name) => self.selected.as_ref() == Some(name),
            Target::CategoryDismiss => {
                self.chip_open
                    && self
                        .selected
                        .as_ref()
                        .is_some_and(|c| !self.dismiss_missing.contains(c))
            }
            Target::ResultCards => !self.shown_cards().is_empty(),
            Target::NextPage => !self.result_pages().is_empty(),
            Target::BudgetTable | Target::Unknown => false,
        })
    }

    fn click(&mut self, page: u64, locator: &Locator) -> Result<(), Error> {
        let target = self.resolve(locator);
        if !self.present(page, &target)? {
            return Err(Error::ElementNotFound {
                locator: locator.to_string(),
            });
        }
        self.clicks += 1;
        match target {
            Target::StatusToggle => self.status_panel_open = !self.status_panel_open,
            Target::StatusCheckbox(status) => {
                let checked = self.checked.entry(status).or_insert(false);
                *checked = !*checked;
                let now = *checked;
                self.events.push(FakeEvent::StatusToggled(status, now));
            }
            Target::ProgrammeToggle => self.programme_menu_open = true,
            Target::ProgrammeOption => {
                self.programme_menu_open = false;
                self.programme_selected = true;
                self.events.push(FakeEvent::ProgrammeSelected);
            }
            Target::CallSelector => {
                self.call_menu_open = true;
                self.events.push(FakeEvent::CallMenuOpened);
            }
            Target::CategoryOption(name) => {
                if self.render_lag > 0 {
                    self.lagging = Some((self.shown_cards().to_vec(), self.render_lag));
                }
                self.call_menu_open = false;
                self.chip_open = false;
                self.selected = Some(name.clone());
                self.current_page = 0;
                self.events.push(FakeEvent::Selected(name));
            }
            Target::CategoryChip(name) => {
                self.chip_open = true;
                self.events.push(FakeEvent::ChipOpened(name));
            }
            Target::CategoryDismiss => {
                self.chip_open = false;
                if let Some(name) = self.selected.take() {
                    self.events.push(FakeEvent::Dismissed(name));
                }
                self.current_page = 0;
            }
            Target::NextPage => {
                if self.current_page + 1 < self.result_pages().len() {
                    self.current_page += 1;
                    self.events.push(FakeEvent::NextPage(self.current_page + 1));
                }
            }
            Target::ProgrammeChip
            | Target::KeywordInput
            | Target::DropdownContainer
            | Target::ResultCards
            | Target::BudgetTable
            | Target::Unknown => {}
        }
        Ok(())
    }

    fn render(&mut self, page: u64) -> Result<String, Error> {
        if page != PRIMARY {
            return Ok(self
                .aux_html(page)?
                .unwrap_or("<html><body></body></html>")
                .to_string());
        }
        let mut html = String::from("<html><body>");
        if self.call_menu_open {
            html.push_str("<div class=\"eui-u-overflow-auto\">");
            for name in self.rendered_categories() {
                let _ = write!(
                    html,
                    "<button class=\"eui-dropdown-item\"><span class=\"eui-u-pr-s\">{}<span class=\"eui-u-ml-xs\">(3)</span></span></button>",
                    escape(name)
                );
            }
            html.push_str("</div>");
        }
        let cards = match self.lagging.take() {
            Some((stale, reads)) => {
                if reads > 1 {
                    self.lagging = Some((stale.clone(), reads - 1));
                }
                stale
            }
            None => self.shown_cards().to_vec(),
        };
        for card in &cards {
            render_card(&mut html, card);
        }
        html.push_str("</body></html>");
        Ok(html)
    }
}

fn render_card(html: &mut String, card: &FakeCard) {
    html.push_str("<sedia-result-card><eui-card-header>");
    let href = card
        .link
        .as_deref()
        .map(|l| format!(" href=\"{}\"", escape(l)))
        .unwrap_or_default();
    let _ = write!(
        html,
        "<a class=\"eui-u-text-link eui-u-font-l eui-u-font-regular\"{}>{}</a>",
        href,
        escape(&card.title)
    );
    if let Some(status) = &card.status {
        let _ = write!(
            html,
            "<eui-card-header-right-content><eui-chip><span class=\"eui-label\">{}</span></eui-chip></eui-card-header-right-content>",
            escape(status)
        );
    }
    html.push_str("</eui-card-header><sedia-result-card-type>");
    if let Some(identifier) = &card.identifier {
        let _ = write!(
            html,
            "<span class=\"ng-star-inserted\">{}</span>",
            escape(identifier)
        );
    }
    html.push_str("</sedia-result-card-type></sedia-result-card>");
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// The fake browser. Clones share state, so a test can keep one clone for
/// inspection and hand another to a [`crate::PortalSession`].
#[derive(Clone, Default)]
pub struct FakePortal {
    state: Arc<Mutex<FakeState>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.lock());
        self
    }

    /// Options of the "Call" dropdown, in display order. Blank and repeated
    /// names are rendered as given.
    pub fn with_categories<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.update(|s| s.categories = names)
    }

    /// Render only `options` dropdown entries at a time, like the portal's
    /// virtual scroller.
    pub fn with_window(self, options: usize) -> Self {
        self.update(|s| s.window = Some(options))
    }

    pub fn with_checked(self, status: CallStatus, checked: bool) -> Self {
        self.update(|s| {
            s.checked.insert(status, checked);
        })
    }

    pub fn with_programme_selected(self) -> Self {
        self.update(|s| s.programme_selected = true)
    }

    /// Cards shown before any category is selected.
    pub fn with_initial_results(self, pages: Vec<Vec<FakeCard>>) -> Self {
        self.update(|s| s.initial_results = pages)
    }

    pub fn with_results(self, category: &str, pages: Vec<Vec<FakeCard>>) -> Self {
        self.update(|s| {
            s.results.insert(category.to_string(), pages);
        })
    }

    /// Page source served for `url` in an auxiliary page.
    pub fn with_detail(self, url: &str, html: impl Into<String>) -> Self {
        let html = html.into();
        self.update(|s| {
            s.details.insert(url.to_string(), html);
        })
    }

    /// After a category option is clicked, page source keeps showing the
    /// previous cards for `reads` more reads.
    pub fn with_render_lag(self, reads: usize) -> Self {
        self.update(|s| s.render_lag = reads)
    }

    /// The chip of `category` never shows its dismiss control.
    pub fn without_dismiss(self, category: &str) -> Self {
        self.update(|s| {
            s.dismiss_missing.insert(category.to_string());
        })
    }

    /// Never render whatever `locator` points at.
    pub fn hiding(self, locator: Locator) -> Self {
        self.update(|s| {
            s.hidden.insert(locator);
        })
    }

    pub fn primary(&self) -> FakePage {
        self.page(PRIMARY)
    }

    fn page(&self, id: u64) -> FakePage {
        FakePage {
            state: Arc::clone(&self.state),
            id,
        }
    }

    pub fn is_checked(&self, status: CallStatus) -> bool {
        self.lock().checked.get(&status).copied().unwrap_or(false)
    }

    pub fn programme_selected(&self) -> bool {
        self.lock().programme_selected
    }

    pub fn keyword(&self) -> Option<String> {
        self.lock().keyword.clone()
    }

    pub fn selected_category(&self) -> Option<String> {
        self.lock().selected.clone()
    }

    pub fn clicks(&self) -> usize {
        self.lock().clicks
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.lock().events.clone()
    }

    pub fn opened_pages(&self) -> usize {
        self.lock().opened
    }

    pub fn closed_pages(&self) -> usize {
        self.lock().closed
    }

    pub fn has_quit(&self) -> bool {
        self.lock().quit
    }
}

#[async_trait]
impl PortalBrowser for FakePortal {
    type Page = FakePage;

    async fn primary_page(&self) -> Result<FakePage, Error> {
        Ok(self.primary())
    }

    async fn open_page(&self) -> Result<FakePage, Error> {
        let id = {
            let mut state = self.lock();
            state.next_page_id += 1;
            let id = state.next_page_id;
            state.aux.insert(id, None);
            state.opened += 1;
            id
        };
        Ok(self.page(id))
    }

    async fn close_page(&self, page: FakePage) -> Result<(), Error> {
        if page.id == PRIMARY {
            return Ok(());
        }
        let mut state = self.lock();
        match state.aux.remove(&page.id) {
            Some(_) => {
                state.closed += 1;
                Ok(())
            }
            None => Err(Error::PageClosed(format!("aux-{}", page.id))),
        }
    }

    async fn quit(&self) -> Result<(), Error> {
        self.lock().quit = true;
        Ok(())
    }
}

/// A tab on the [`FakePortal`].
#[derive(Clone)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
    id: u64,
}

impl FakePage {
    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> Result<R, Error>) -> Result<R, Error> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn require(&self, state: &FakeState, locator: &Locator) -> Result<Target, Error> {
        let target = state.resolve(locator);
        if state.present(self.id, &target)? {
            Ok(target)
        } else {
            Err(Error::ElementNotFound {
                locator: locator.to_string(),
            })
        }
    }
}

#[async_trait]
impl PortalPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), Error> {
        let id = self.id;
        self.with_state(|s| {
            if id != PRIMARY {
                let slot = s
                    .aux
                    .get_mut(&id)
                    .ok_or_else(|| Error::PageClosed(format!("aux-{}", id)))?;
                *slot = Some(url.to_string());
            }
            s.events.push(FakeEvent::Navigated(url.to_string()));
            Ok(())
        })
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), Error> {
        let id = self.id;
        self.with_state(|s| {
            let target = s.resolve(locator);
            if s.present(id, &target)? {
                Ok(())
            } else {
                Err(Error::Timeout {
                    locator: locator.to_string(),
                    timeout_ms: timeout.as_millis(),
                })
            }
        })
    }

    async fn exists(&self, locator: &Locator) -> Result<bool, Error> {
        let id = self.id;
        self.with_state(|s| {
            let target = s.resolve(locator);
            s.present(id, &target)
        })
    }

    async fn count(&self, locator: &Locator) -> Result<usize, Error> {
        let id = self.id;
        self.with_state(|s| {
            let target = s.resolve(locator);
            if !s.present(id, &target)? {
                return Ok(0);
            }
            Ok(match target {
                Target::ResultCards => s.shown_cards().len(),
                _ => 1,
            })
        })
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, Error> {
        self.exists(locator).await
    }

    async fn is_checked(&self, locator: &Locator) -> Result<bool, Error> {
        self.with_state(|s| match self.require(s, locator)? {
            Target::StatusCheckbox(status) => Ok(s.checked.get(&status).copied().unwrap_or(false)),
            _ => Ok(false),
        })
    }

    async fn is_disabled(&self, locator: &Locator) -> Result<bool, Error> {
        self.with_state(|s| match self.require(s, locator)? {
            Target::NextPage => Ok(s.current_page + 1 >= s.result_pages().len()),
            _ => Ok(false),
        })
    }

    async fn click(&self, locator: &Locator) -> Result<(), Error> {
        let id = self.id;
        self.with_state(|s| s.click(id, locator))
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), Error> {
        self.with_state(|s| {
            if self.require(s, locator)? == Target::KeywordInput {
                s.keyword_text = text.to_string();
            }
            Ok(())
        })
    }

    async fn submit(&self, locator: &Locator) -> Result<(), Error> {
        self.with_state(|s| {
            if self.require(s, locator)? == Target::KeywordInput {
                let keyword = s.keyword_text.clone();
                s.events.push(FakeEvent::KeywordSubmitted(keyword.clone()));
                s.keyword = Some(keyword);
            }
            Ok(())
        })
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), Error> {
        self.with_state(|s| self.require(s, locator).map(|_| ()))
    }

    async fn scroll_by(&self, container: &Locator, dy: i64) -> Result<(), Error> {
        self.with_state(|s| {
            if self.require(s, container)? == Target::DropdownContainer {
                s.scroll_px = (s.scroll_px + dy).clamp(0, s.max_scroll());
            }
            Ok(())
        })
    }

    async fn scroll_to_top(&self, container: &Locator) -> Result<(), Error> {
        self.with_state(|s| {
            if self.require(s, container)? == Target::DropdownContainer {
                s.scroll_px = 0;
            }
            Ok(())
        })
    }

    async fn content(&self) -> Result<String, Error> {
        let id = self.id;
        self.with_state(|s| s.render(id))
    }
}
