//! CLI subcommand implementations.

pub mod calls;
pub mod categories;
pub mod scrape;
pub mod status;

use fundingcalls_lib::{CallStatus, FilterState};

/// Filter state from the `--forthcoming/--open/--closed` flags and keyword.
/// No status flag leaves the portal's defaults alone.
pub(crate) fn filter_state(
    forthcoming: bool,
    open: bool,
    closed: bool,
    keyword: Option<&str>,
) -> FilterState {
    let statuses = [
        (CallStatus::Forthcoming, forthcoming),
        (CallStatus::Open, open),
        (CallStatus::Closed, closed),
    ]
    .into_iter()
    .filter_map(|(status, wanted)| wanted.then_some(status));
    let state = FilterState::new().with_statuses(statuses);
    match keyword {
        Some(keyword) => state.with_keyword(keyword),
        None => state,
    }
}
