use std::collections::{HashMap, HashSet};

use fundingcalls_portal::types::{DetailRecord, MergedRecord, SummaryRecord};

/// Left-join cards with budget rows on identifier.
///
/// Each card identifier appears once (first card wins) and each identifier
/// takes its first budget row. Cards without an identifier are all kept.
/// A budget row without an identifier (the total-funding fallback) is
/// applied to every card that has no row of its own.
pub fn merge(summaries: &[SummaryRecord], details: &[DetailRecord]) -> Vec<MergedRecord> {
    let mut keyed: HashMap<&str, &DetailRecord> = HashMap::new();
    let mut fallback: Option<&DetailRecord> = None;
    for detail in details {
        match detail.identifier.found() {
            Some(id) => {
                keyed.entry(id.as_str()).or_insert(detail);
            }
            None if fallback.is_none() => fallback = Some(detail),
            None => {}
        }
    }

    let mut seen = HashSet::new();
    summaries
        .iter()
        .filter(|summary| match summary.identifier.found() {
            Some(id) => seen.insert(id.as_str()),
            None => true,
        })
        .map(|summary| {
            let detail = summary
                .identifier
                .found()
                .and_then(|id| keyed.get(id.as_str()).copied())
                .or(fallback);
            MergedRecord::from_parts(summary, detail)
        })
        .collect()
}
