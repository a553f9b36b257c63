//! Search filter state applied to the portal before harvesting.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Submission status of a call, as offered by the "Submission status" filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Forthcoming,
    Open,
    Closed,
}

impl CallStatus {
    pub const ALL: [CallStatus; 3] = [Self::Forthcoming, Self::Open, Self::Closed];

    /// DOM id of the status checkbox on the portal.
    pub fn checkbox_id(&self) -> &'static str {
        match self {
            Self::Forthcoming => "31094501",
            Self::Open => "31094502",
            Self::Closed => "31094503",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Forthcoming => "Forthcoming",
            Self::Open => "Open For Submission",
            Self::Closed => "Closed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forthcoming => "forthcoming",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forthcoming" => Ok(Self::Forthcoming),
            "open" | "open for submission" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown call status '{}'", other)),
        }
    }
}

/// Funding programme selected in the "Programme" dropdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Programme {
    #[default]
    HorizonEurope,
}

impl Programme {
    /// Exact text of the programme's dropdown entry.
    pub fn label(&self) -> &'static str {
        match self {
            Self::HorizonEurope => "Horizon Europe (HORIZON)",
        }
    }
}

/// Desired state of the search filters.
///
/// `statuses` lists the checkboxes that should end up checked; an empty set
/// leaves the portal's own defaults untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub statuses: BTreeSet<CallStatus>,
    pub keyword: Option<String>,
    pub programme: Programme,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: CallStatus) -> Self {
        self.statuses.insert(status);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = CallStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn with_keyword(mut self, keyword: &str) -> Self {
        let keyword = keyword.trim();
        self.keyword = (!keyword.is_empty()).then(|| keyword.to_string());
        self
    }

    pub fn with_programme(mut self, programme: Programme) -> Self {
        self.programme = programme;
        self
    }

    /// Whether `status` should be checked. Only meaningful when
    /// [`Self::manages_statuses`] is true.
    pub fn desired(&self, status: CallStatus) -> bool {
        self.statuses.contains(&status)
    }

    pub fn manages_statuses(&self) -> bool {
        !self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkbox_ids_are_distinct() {
        let ids: BTreeSet<_> = CallStatus::ALL.iter().map(|s| s.checkbox_id()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(CallStatus::Closed.checkbox_id(), "31094503");
    }

    #[test]
    fn builder_collects_statuses() {
        let filters = FilterState::new()
            .with_status(CallStatus::Open)
            .with_statuses([CallStatus::Forthcoming, CallStatus::Open]);
        assert!(filters.desired(CallStatus::Open));
        assert!(filters.desired(CallStatus::Forthcoming));
        assert!(!filters.desired(CallStatus::Closed));
        assert_eq!(filters.programme, Programme::HorizonEurope);
    }

    #[test]
    fn blank_keyword_is_dropped() {
        assert_eq!(FilterState::new().with_keyword("  ").keyword, None);
        assert_eq!(
            FilterState::new().with_keyword(" quantum ").keyword.as_deref(),
            Some("quantum")
        );
    }

    #[test]
    fn parses_status_names() {
        assert_eq!("Open".parse::<CallStatus>().unwrap(), CallStatus::Open);
        assert_eq!("closed".parse::<CallStatus>().unwrap(), CallStatus::Closed);
        assert!("pending".parse::<CallStatus>().is_err());
    }
}
