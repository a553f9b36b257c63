use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use url::Url;

use super::Extracted;

pub const NO_IDENTIFIER: &str = "No identifier found";
pub const NO_TITLE: &str = "No title";
pub const NO_STATUS: &str = "No status found";
pub const NO_LINK: &str = "No link";
pub const NO_ACTION: &str = "No action";
pub const NO_BUDGET: &str = "No budget found";
pub const NO_DEADLINE: &str = "No deadline found";
pub const NO_FUNDING: &str = "No funding info";
pub const NO_SUBMISSION: &str = "No submission info";

/// One result card from a search results page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub identifier: Extracted<String>,
    pub title: Extracted<String>,
    pub status: Extracted<String>,
    pub detail_link: Option<Url>,
}

/// Type of action encoded in a topic identifier (`HORIZON-CL4-2024-RIA-01`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Ria,
    Ia,
    Csa,
    Msca,
    Eic,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [Self::Ria, Self::Ia, Self::Csa, Self::Msca, Self::Eic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ria => "RIA",
            Self::Ia => "IA",
            Self::Csa => "CSA",
            Self::Msca => "MSCA",
            Self::Eic => "EIC",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown action type '{}'", s))
    }
}

/// EU contribution per project as published in a budget table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingRange {
    /// "between X and Y", published as "X to Y".
    Range { min: String, max: String },
    /// "around X".
    Approx(String),
    /// Anything else, kept verbatim.
    Raw(String),
}

impl fmt::Display for FundingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => write!(f, "Min: {} Max: {}", min, max),
            Self::Approx(v) => write!(f, "~ {}", v),
            Self::Raw(v) => f.write_str(v),
        }
    }
}

impl Serialize for FundingRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One row of a call's budget table (or the synthesized fallback row).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRecord {
    pub identifier: Extracted<String>,
    pub action_type: Extracted<ActionType>,
    pub budget: Extracted<String>,
    pub opening_date: Option<NaiveDate>,
    pub deadline_primary: Extracted<NaiveDate>,
    pub deadline_secondary: Option<NaiveDate>,
    pub funding_per_project: Extracted<FundingRange>,
    pub accepted_projects: Extracted<String>,
}

impl DetailRecord {
    /// The record synthesized from a "Total funding available" block when a
    /// page has no budget table: no identifier, only the budget.
    pub fn fallback(budget: Extracted<String>) -> Self {
        Self {
            identifier: Extracted::Missing(NO_IDENTIFIER),
            action_type: Extracted::Missing(NO_ACTION),
            budget,
            opening_date: None,
            deadline_primary: Extracted::Missing(NO_DEADLINE),
            deadline_secondary: None,
            funding_per_project: Extracted::Missing(NO_FUNDING),
            accepted_projects: Extracted::Missing(NO_SUBMISSION),
        }
    }
}

/// Likelihood bucket derived from the indicative number of funded projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProbabilityRate {
    Low,
    Medium,
    High,
    Unknown,
}

impl ProbabilityRate {
    /// 2 or fewer accepted projects is Low, exactly 3 is Medium, 4 or more
    /// is High. Text that is not a whole number maps to Unknown.
    pub fn from_accepted(accepted: Option<&str>) -> Self {
        match accepted.map(str::trim).and_then(|s| s.parse::<u64>().ok()) {
            Some(n) if n <= 2 => Self::Low,
            Some(3) => Self::Medium,
            Some(_) => Self::High,
            None => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ProbabilityRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbabilityRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown probability rate '{}'", other)),
        }
    }
}

/// A result card joined with its budget-table row.
///
/// Field order is the output column order: `identifier` and `action_type`
/// always come first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub identifier: Extracted<String>,
    pub action_type: Extracted<ActionType>,
    pub title: Extracted<String>,
    pub status: Extracted<String>,
    pub budget: Extracted<String>,
    pub funding_per_project: Extracted<FundingRange>,
    pub opening_date: Option<NaiveDate>,
    pub deadline_primary: Extracted<NaiveDate>,
    pub deadline_secondary: Option<NaiveDate>,
    pub accepted_projects: Extracted<String>,
    pub probability_rate: ProbabilityRate,
    pub link: Option<Url>,
}

impl MergedRecord {
    pub const COLUMNS: [&'static str; 12] = [
        "identifier",
        "action_type",
        "title",
        "status",
        "budget",
        "funding_per_project",
        "opening_date",
        "deadline_primary",
        "deadline_secondary",
        "accepted_projects",
        "probability_rate",
        "link",
    ];

    /// Join a card with its detail row. Without a detail row every detail
    /// column is missing.
    pub fn from_parts(summary: &SummaryRecord, detail: Option<&DetailRecord>) -> Self {
        let detail = detail
            .cloned()
            .unwrap_or_else(|| DetailRecord::fallback(Extracted::Missing(NO_BUDGET)));
        let probability_rate =
            ProbabilityRate::from_accepted(detail.accepted_projects.found().map(String::as_str));
        Self {
            identifier: summary.identifier.clone(),
            action_type: detail.action_type,
            title: summary.title.clone(),
            status: summary.status.clone(),
            budget: detail.budget,
            funding_per_project: detail.funding_per_project,
            opening_date: detail.opening_date,
            deadline_primary: detail.deadline_primary,
            deadline_secondary: detail.deadline_secondary,
            accepted_projects: detail.accepted_projects,
            probability_rate,
            link: summary.detail_link.clone(),
        }
    }

    /// Display values in [`Self::COLUMNS`] order.
    pub fn to_row(&self) -> Vec<String> {
        let optional_date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        vec![
            self.identifier.to_string(),
            self.action_type.to_string(),
            self.title.to_string(),
            self.status.to_string(),
            self.budget.to_string(),
            self.funding_per_project.to_string(),
            optional_date(self.opening_date),
            self.deadline_primary.to_string(),
            optional_date(self.deadline_secondary),
            self.accepted_projects.to_string(),
            self.probability_rate.to_string(),
            self.link
                .as_ref()
                .map(Url::to_string)
                .unwrap_or_else(|| NO_LINK.to_string()),
        ]
    }
}
