//! The end-to-end scrape: filters, category enumeration, and per category
//! selection, harvesting, detail lookup, merging and persistence.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use fundingcalls_portal::types::DetailRecord;
use fundingcalls_portal::{FilterState, PortalBrowser, PortalPage, WebDriverBrowser};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::categories::list_categories;
use crate::category_select::select_category;
use crate::config::{DetailStrategy, ScraperConfig};
use crate::db::{Db, RunState};
use crate::detail::fetch_details;
use crate::error::ScrapeError;
use crate::filters::apply_filters;
use crate::harvest::{harvest_category, Harvest};
use crate::merge::merge;
use crate::parse::group_name;
use crate::session::PortalSession;

/// Which categories a run should visit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategorySelection {
    #[default]
    All,
    Named(Vec<String>),
}

impl CategorySelection {
    /// Build a selection from command-line values. No values, `0` or `all`
    /// select every category.
    pub fn from_args(values: &[String]) -> Self {
        let names: Vec<String> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty()
            || names
                .iter()
                .any(|n| n == "0" || n.eq_ignore_ascii_case("all"))
        {
            Self::All
        } else {
            Self::Named(names)
        }
    }

    /// The categories to visit, given what the portal offers.
    ///
    /// Named categories keep their requested order; names the portal does
    /// not offer are dropped with a warning.
    pub fn resolve(&self, offered: &[String]) -> Vec<String> {
        match self {
            Self::All => offered.to_vec(),
            Self::Named(names) => {
                let mut seen = HashSet::new();
                names
                    .iter()
                    .filter(|name| {
                        if !offered.contains(name) {
                            tracing::warn!("Category '{}' is not offered by the portal, ignoring", name);
                            return false;
                        }
                        seen.insert(name.as_str())
                    })
                    .cloned()
                    .collect()
            }
        }
    }
}

/// Everything a run needs besides the session and the store.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    pub filters: FilterState,
    pub categories: CategorySelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    FiltersApplied,
    CategoriesEnumerated,
    Selecting,
    Harvesting,
    DetailFetching,
    Merging,
    Persisting,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FiltersApplied => "filters applied",
            Self::CategoriesEnumerated => "categories enumerated",
            Self::Selecting => "selecting",
            Self::Harvesting => "harvesting",
            Self::DetailFetching => "fetching details",
            Self::Merging => "merging",
            Self::Persisting => "persisting",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one category ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CategoryOutcome {
    Persisted {
        stored: usize,
        skipped: usize,
        pages: usize,
    },
    /// The category could not be selected or read; the run moved on.
    Skipped { reason: String },
    /// An unexpected error ended this category; the run moved on.
    Failed { reason: String },
}

impl CategoryOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

/// Progress notifications sent while a run is underway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Stage {
        stage: PipelineStage,
        category: Option<String>,
    },
    CategoriesResolved {
        total: usize,
    },
    CategoryFinished {
        category: String,
        outcome: CategoryOutcome,
    },
}

pub type ProgressSender = UnboundedSender<ProgressEvent>;

/// Summary of a finished run, returned to in-process callers.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub categories: Vec<(String, CategoryOutcome)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn stored(&self) -> usize {
        self.categories
            .iter()
            .map(|(_, outcome)| match outcome {
                CategoryOutcome::Persisted { stored, .. } => *stored,
                _ => 0,
            })
            .sum()
    }

    pub fn skipped_categories(&self) -> usize {
        self.categories
            .iter()
            .filter(|(_, outcome)| !outcome.is_persisted())
            .count()
    }
}

struct Progress<'a>(Option<&'a ProgressSender>);

impl Progress<'_> {
    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = self.0 {
            // The receiver going away only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    fn stage(&self, stage: PipelineStage, category: Option<&str>) {
        match category {
            Some(category) => tracing::debug!(%stage, category, "Pipeline stage"),
            None => tracing::debug!(%stage, "Pipeline stage"),
        }
        self.emit(ProgressEvent::Stage {
            stage,
            category: category.map(str::to_string),
        });
    }
}

/// Run a complete scrape on an open session.
///
/// The run-status record is claimed before anything touches the portal and
/// released as completed or failed on every exit path. Fails with
/// [`ScrapeError::RunInProgress`] when another run holds it.
pub async fn run_scrape<B: PortalBrowser>(
    session: &PortalSession<B>,
    db: &mut Db,
    request: &ScrapeRequest,
    progress: Option<&ProgressSender>,
) -> Result<RunReport, ScrapeError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    if !db.begin_run(&run_id)? {
        let current = db.run_status()?;
        return Err(ScrapeError::RunInProgress {
            run_id: current.run_id.unwrap_or_default(),
        });
    }

    let started_at = Utc::now();
    let span = tracing::info_span!("scrape", run_id = %run_id);
    let result = scrape_categories(session, db, request, Progress(progress))
        .instrument(span)
        .await;

    let (state, message) = match &result {
        Ok(outcomes) => {
            let skipped = outcomes.iter().filter(|(_, o)| !o.is_persisted()).count();
            let message = format!("{} categories, {} not persisted", outcomes.len(), skipped);
            (RunState::Completed, message)
        }
        Err(e) => (RunState::Failed, e.to_string()),
    };
    if let Err(e) = db.finish_run(&run_id, state, Some(&message)) {
        tracing::error!("Failed to record end of run {}: {}", run_id, e);
    }
    Progress(progress).stage(PipelineStage::Idle, None);

    let categories = result?;
    if let Err(e) = db.set_meta("last_successful_run", &Utc::now().to_rfc3339()) {
        tracing::warn!("Failed to record last successful run: {}", e);
    }
    let report = RunReport {
        run_id,
        categories,
        started_at,
        finished_at: Utc::now(),
    };
    tracing::info!(
        "Scrape finished: {} calls stored, {} of {} categories not persisted",
        report.stored(),
        report.skipped_categories(),
        report.categories.len()
    );
    Ok(report)
}

async fn scrape_categories<B: PortalBrowser>(
    session: &PortalSession<B>,
    db: &mut Db,
    request: &ScrapeRequest,
    progress: Progress<'_>,
) -> Result<Vec<(String, CategoryOutcome)>, ScrapeError> {
    let page = session.page();
    let config = session.config();

    page.goto(&config.portal_url).await?;
    apply_filters(page, &request.filters, config).await?;
    progress.stage(PipelineStage::FiltersApplied, None);

    let offered = list_categories(page, config).await?;
    let targets = request.categories.resolve(&offered);
    progress.stage(PipelineStage::CategoriesEnumerated, None);
    progress.emit(ProgressEvent::CategoriesResolved {
        total: targets.len(),
    });
    tracing::info!(
        "Scraping {} of {} offered categories",
        targets.len(),
        offered.len()
    );

    for category in &targets {
        db.register_category(category, Some(&group_name(category)))?;
    }

    let mut active: Option<String> = None;
    let mut outcomes = Vec::with_capacity(targets.len());
    for category in &targets {
        let span = tracing::info_span!("category", category = %category);
        let outcome = scrape_category(session, db, category, &mut active, &progress)
            .instrument(span)
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) if e.is_category_scoped() => {
                tracing::warn!(category = %category, "{}", e);
                CategoryOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e @ ScrapeError::Db(_)) => return Err(e),
            Err(e) => {
                tracing::error!(category = %category, "Category failed: {}", e);
                CategoryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        progress.emit(ProgressEvent::CategoryFinished {
            category: category.clone(),
            outcome: outcome.clone(),
        });
        outcomes.push((category.clone(), outcome));
    }
    Ok(outcomes)
}

async fn scrape_category<B: PortalBrowser>(
    session: &PortalSession<B>,
    db: &mut Db,
    category: &str,
    active: &mut Option<String>,
    progress: &Progress<'_>,
) -> Result<CategoryOutcome, ScrapeError> {
    let page = session.page();
    let config = session.config();

    progress.stage(PipelineStage::Selecting, Some(category));
    let stale_ids = select_category(page, category, active, config).await?;

    progress.stage(PipelineStage::Harvesting, Some(category));
    let harvest = harvest_category(page, config, session.origin(), &stale_ids).await?;

    progress.stage(PipelineStage::DetailFetching, Some(category));
    let details = collect_details(session, &harvest).await;

    progress.stage(PipelineStage::Merging, Some(category));
    let merged = merge(&harvest.summaries, &details);

    progress.stage(PipelineStage::Persisting, Some(category));
    let summary = db.upsert_calls(&merged, category)?;
    tracing::info!(
        stored = summary.stored,
        skipped = summary.skipped,
        pages = harvest.pages,
        "Category persisted"
    );
    Ok(CategoryOutcome::Persisted {
        stored: summary.stored,
        skipped: summary.skipped,
        pages: harvest.pages,
    })
}

/// Budget rows for a harvested category. Detail failures never end the
/// category; its cards are stored without budget data instead.
async fn collect_details<B: PortalBrowser>(
    session: &PortalSession<B>,
    harvest: &Harvest,
) -> Vec<DetailRecord> {
    let config = session.config();
    match config.detail_strategy {
        DetailStrategy::SampleFirst => {
            let Some(link) = &harvest.first_detail_link else {
                tracing::debug!("No detail link on the first card");
                return Vec::new();
            };
            match fetch_details(session.browser(), link, config).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!("{}", e);
                    Vec::new()
                }
            }
        }
        DetailStrategy::PerRecord => {
            let mut rows = Vec::new();
            for summary in &harvest.summaries {
                let Some(link) = &summary.detail_link else {
                    continue;
                };
                match fetch_details(session.browser(), link, config).await {
                    Ok(fetched) => {
                        // A fallback row belongs to the card it was fetched for.
                        rows.extend(fetched.into_iter().map(|mut row| {
                            if !row.identifier.is_found() {
                                row.identifier = summary.identifier.clone();
                            }
                            row
                        }))
                    }
                    Err(e) => tracing::warn!("{}", e),
                }
            }
            rows
        }
    }
}

/// Launch a browser as configured and run a scrape on the tokio runtime.
///
/// The run-status record is checked before the browser starts, and the
/// browser is shut down however the run ends.
pub fn spawn_scrape(
    config: ScraperConfig,
    request: ScrapeRequest,
    progress: Option<ProgressSender>,
) -> JoinHandle<Result<RunReport, ScrapeError>> {
    tokio::spawn(async move {
        let mut db = Db::open(&config.db_path)?;
        db.init()?;
        let status = db.run_status()?;
        if status.is_running() {
            return Err(ScrapeError::RunInProgress {
                run_id: status.run_id.unwrap_or_default(),
            });
        }

        let session = PortalSession::<WebDriverBrowser>::launch(config).await?;
        let result = run_scrape(&session, &mut db, &request, progress.as_ref()).await;
        if let Err(e) = session.close().await {
            tracing::warn!("Failed to shut down browser: {}", e);
        }
        result
    })
}

/// Apply `filters` on an open session and list the categories on offer.
pub async fn enumerate_categories<B: PortalBrowser>(
    session: &PortalSession<B>,
    filters: &FilterState,
) -> Result<Vec<String>, ScrapeError> {
    let page = session.page();
    let config = session.config();
    page.goto(&config.portal_url).await?;
    apply_filters(page, filters, config).await?;
    list_categories(page, config).await
}

/// Launch a browser, list the categories offered for `filters`, and shut
/// the browser down again.
pub async fn list_categories_for(
    config: ScraperConfig,
    filters: &FilterState,
) -> Result<Vec<String>, ScrapeError> {
    let session = PortalSession::<WebDriverBrowser>::launch(config).await?;
    let result = enumerate_categories(&session, filters).await;
    if let Err(e) = session.close().await {
        tracing::warn!("Failed to shut down browser: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn selection_from_args() {
        assert_eq!(CategorySelection::from_args(&[]), CategorySelection::All);
        assert_eq!(
            CategorySelection::from_args(&names(&["0"])),
            CategorySelection::All
        );
        assert_eq!(
            CategorySelection::from_args(&names(&["CL4", "ALL"])),
            CategorySelection::All
        );
        assert_eq!(
            CategorySelection::from_args(&names(&["CL4", " ", "CL5"])),
            CategorySelection::Named(names(&["CL4", "CL5"]))
        );
    }

    #[test]
    fn resolve_keeps_requested_order_and_drops_unknown() {
        let offered = names(&["CL4", "CL5", "CL6"]);
        let selection = CategorySelection::Named(names(&["CL6", "CL9", "CL4", "CL6"]));
        assert_eq!(selection.resolve(&offered), names(&["CL6", "CL4"]));
        assert_eq!(CategorySelection::All.resolve(&offered), offered);
    }

    #[test]
    fn report_counts() {
        let report = RunReport {
            run_id: "r".into(),
            categories: vec![
                (
                    "CL4".into(),
                    CategoryOutcome::Persisted {
                        stored: 3,
                        skipped: 1,
                        pages: 2,
                    },
                ),
                (
                    "CL5".into(),
                    CategoryOutcome::Skipped {
                        reason: "gone".into(),
                    },
                ),
            ],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert_eq!(report.stored(), 3);
        assert_eq!(report.skipped_categories(), 1);
    }
}
