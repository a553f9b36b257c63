//! Pure HTML parsers for portal page source.
//!
//! Each parser takes the serialized DOM and returns owned records, so no
//! `scraper::Html` is ever held across an await point.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use fundingcalls_portal::types::{
    ActionType, DetailRecord, Extracted, FundingRange, SummaryRecord, NO_ACTION, NO_BUDGET,
    NO_DEADLINE, NO_FUNDING, NO_IDENTIFIER, NO_STATUS, NO_SUBMISSION, NO_TITLE,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::selectors;

static RE_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-(RIA|IA|CSA|MSCA|EIC)\b").expect("valid action type regex")
});

static RE_ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid iso date regex"));

static RE_LONG_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2} [A-Za-z]+ \d{4})\b").expect("valid long date regex")
});

static SEL_OPTION_LABEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&format!(
        "{} {} {}",
        selectors::DROPDOWN_CONTAINER_CSS,
        selectors::DROPDOWN_ITEM_CSS,
        selectors::DROPDOWN_LABEL_CSS
    ))
    .expect("valid option label selector")
});

static SEL_CARD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(selectors::RESULT_CARD_CSS).expect("valid card selector")
});

static SEL_CARD_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(selectors::CARD_LINK_CSS).expect("valid card link selector")
});

static SEL_CARD_IDENTIFIER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(selectors::CARD_IDENTIFIER_CSS).expect("valid card identifier selector")
});

static SEL_CARD_STATUS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(selectors::CARD_STATUS_CSS).expect("valid card status selector")
});

static SEL_TABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(selectors::BUDGET_TABLE_CSS).expect("valid table selector")
});

static SEL_HEADER_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("thead th, thead td").expect("valid header selector"));

static SEL_BODY_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tbody tr").expect("valid row selector"));

static SEL_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid cell selector"));

static SEL_INPUT_GROUP: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.eui-input-group").expect("valid input group selector"));

static SEL_FUNDING_VALUE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(selectors::TOTAL_FUNDING_VALUE_CSS).expect("valid funding value selector")
});

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Option labels of the open category dropdown, in DOM order.
///
/// The label is the first text node of each option's label span (later
/// nodes hold result counts). Blank and repeated labels are dropped.
pub fn parse_category_labels(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    for span in document.select(&SEL_OPTION_LABEL) {
        let Some(text) = span
            .first_child()
            .and_then(|node| node.value().as_text().map(|t| t.trim().to_string()))
        else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        if seen.insert(text.clone()) {
            labels.push(text);
        }
    }
    labels
}

/// Every result card on a search results page.
///
/// Relative detail links are resolved against `origin`.
pub fn parse_result_cards(html: &str, origin: &Url) -> Vec<SummaryRecord> {
    let document = Html::parse_document(html);
    document
        .select(&SEL_CARD)
        .map(|card| {
            let link_elem = card.select(&SEL_CARD_LINK).next();
            let title = Extracted::text(
                link_elem.map(|e| normalize_whitespace(&elem_text(e))).as_deref(),
                NO_TITLE,
            );
            let identifier = Extracted::text(
                card.select(&SEL_CARD_IDENTIFIER)
                    .next()
                    .map(elem_text)
                    .as_deref(),
                NO_IDENTIFIER,
            );
            let status = Extracted::text(
                card.select(&SEL_CARD_STATUS).next().map(elem_text).as_deref(),
                NO_STATUS,
            );
            let detail_link = link_elem
                .and_then(|e| e.value().attr("href"))
                .filter(|href| !href.trim().is_empty())
                .and_then(|href| match origin.join(href.trim()) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::debug!("Unusable card link '{}': {}", href, e);
                        None
                    }
                });
            if !status.is_found() {
                tracing::debug!("Card {} has no status chip", identifier);
            }
            SummaryRecord {
                identifier,
                title,
                status,
                detail_link,
            }
        })
        .collect()
}

/// Identifiers of the cards currently shown, used to detect a page turn.
pub fn parse_card_identifiers(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&SEL_CARD)
        .filter_map(|card| card.select(&SEL_CARD_IDENTIFIER).next())
        .map(|e| elem_text(e).trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Column positions in a topic budget table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetColumns {
    pub identifier: usize,
    pub budget: usize,
    pub stages: usize,
    pub opening: usize,
    pub deadline: usize,
    pub funding: usize,
    pub accepted: usize,
}

impl Default for BudgetColumns {
    fn default() -> Self {
        Self {
            identifier: 0,
            budget: 1,
            stages: 2,
            opening: 3,
            deadline: 4,
            funding: 5,
            accepted: 6,
        }
    }
}

impl BudgetColumns {
    /// Resolve positions from header text, falling back to the usual layout
    /// for any column whose header is not recognised.
    pub fn from_headers(headers: &[String]) -> Self {
        let mut columns = Self::default();
        let mut identifier = None;
        for (idx, header) in headers.iter().enumerate() {
            let h = header.to_lowercase();
            if h.contains("budget") {
                columns.budget = idx;
            } else if h.contains("stage") {
                columns.stages = idx;
            } else if h.contains("opening") {
                columns.opening = idx;
            } else if h.contains("deadline") {
                columns.deadline = idx;
            } else if h.contains("contribution") {
                columns.funding = idx;
            } else if h.contains("indicative") {
                columns.accepted = idx;
            } else if identifier.is_none() {
                identifier = Some(idx);
            }
        }
        if let Some(idx) = identifier {
            columns.identifier = idx;
        }
        columns
    }
}

/// Rows of the first budget table on a topic page.
pub fn parse_budget_table(html: &str) -> Vec<DetailRecord> {
    let document = Html::parse_document(html);
    let Some(table) = document.select(&SEL_TABLE).next() else {
        return Vec::new();
    };
    let headers: Vec<String> = table
        .select(&SEL_HEADER_CELL)
        .map(|th| normalize_whitespace(&elem_text(th)))
        .collect();
    let columns = if headers.is_empty() {
        BudgetColumns::default()
    } else {
        BudgetColumns::from_headers(&headers)
    };

    table
        .select(&SEL_BODY_ROW)
        .filter_map(|row| {
            let cells: Vec<String> = row
                .select(&SEL_CELL)
                .map(|td| normalize_whitespace(&elem_text(td)))
                .collect();
            if cells.iter().all(|c| c.is_empty()) {
                return None;
            }
            Some(detail_from_cells(&cells, &columns))
        })
        .collect()
}

fn detail_from_cells(cells: &[String], columns: &BudgetColumns) -> DetailRecord {
    let cell = |idx: usize| cells.get(idx).map(String::as_str).filter(|c| !c.is_empty());

    let raw_identifier = cell(columns.identifier);
    let identifier = Extracted::text(
        raw_identifier.and_then(|raw| raw.split_whitespace().next()),
        NO_IDENTIFIER,
    );
    let action_type =
        Extracted::from_option(raw_identifier.and_then(parse_action_type), NO_ACTION);
    let budget = Extracted::from_option(cell(columns.budget).and_then(normalize_budget), NO_BUDGET);
    let opening_date = cell(columns.opening).and_then(|c| parse_dates(c).into_iter().next());
    let deadlines = cell(columns.deadline).map(parse_dates).unwrap_or_default();
    let funding_per_project =
        Extracted::from_option(cell(columns.funding).and_then(parse_funding_range), NO_FUNDING);
    let accepted_projects = Extracted::text(cell(columns.accepted), NO_SUBMISSION);

    if !identifier.is_found() {
        tracing::debug!("Budget row without identifier: {:?}", cells);
    }

    DetailRecord {
        identifier,
        action_type,
        budget,
        opening_date,
        deadline_primary: Extracted::from_option(deadlines.first().copied(), NO_DEADLINE),
        deadline_secondary: deadlines.get(1).copied(),
        funding_per_project,
        accepted_projects,
    }
}

/// The "Total funding available" amount on topic pages without a budget table.
pub fn parse_total_funding(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&SEL_INPUT_GROUP)
        .filter(|group| elem_text(*group).contains(selectors::TOTAL_FUNDING_LABEL))
        .filter_map(|group| group.select(&SEL_FUNDING_VALUE).next())
        .find_map(|value| normalize_budget(&elem_text(value)))
}

/// Strip whitespace (including narrow no-break spaces), the euro sign and
/// trailing periods from a currency amount.
pub fn normalize_budget(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€' && *c != '\u{202f}')
        .collect();
    let cleaned = cleaned.trim_end_matches('.');
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Parse a "contribution per project" cell.
pub fn parse_funding_range(raw: &str) -> Option<FundingRange> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    if let Some((min, max)) = raw.split_once(" to ") {
        return Some(FundingRange::Range {
            min: strip(min),
            max: strip(max),
        });
    }
    if let Some(rest) = raw.strip_prefix("around") {
        return Some(FundingRange::Approx(rest.trim().to_string()));
    }
    if raw.contains("around") {
        return Some(FundingRange::Approx(raw.replace("around", "").trim().to_string()));
    }
    Some(FundingRange::Raw(raw.to_string()))
}

/// The action type encoded in a topic identifier, e.g. `RIA` in
/// `HORIZON-CL4-2024-RESILIENCE-01-RIA`.
pub fn parse_action_type(identifier: &str) -> Option<ActionType> {
    RE_ACTION
        .captures(identifier)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Every date in a cell, in order. ISO dates win; "18 September 2024"
/// style dates are read when no ISO date is present.
pub fn parse_dates(raw: &str) -> Vec<NaiveDate> {
    let iso: Vec<NaiveDate> = RE_ISO_DATE
        .captures_iter(raw)
        .filter_map(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
        .collect();
    if !iso.is_empty() {
        return iso;
    }
    RE_LONG_DATE
        .captures_iter(raw)
        .filter_map(|c| {
            NaiveDate::parse_from_str(&c[1], "%d %B %Y")
                .or_else(|_| NaiveDate::parse_from_str(&c[1], "%d %b %Y"))
                .ok()
        })
        .collect()
}

/// Programme group of a call identifier: `HORIZON-CL4-D3-2024` gives `CL4`;
/// identifiers outside HORIZON give their first segment.
pub fn group_name(identifier: &str) -> String {
    let mut parts = identifier.split('-');
    match (parts.next(), parts.next()) {
        (Some("HORIZON"), Some(group)) if !group.is_empty() => group.to_string(),
        (Some(first), _) => first.to_string(),
        (None, _) => String::new(),
    }
}

/// `18 SEP 2024` style rendering used in tables.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse(selectors::PORTAL_ORIGIN).unwrap()
    }

    #[test]
    fn budget_normalization() {
        assert_eq!(normalize_budget("€1 234 567,00").as_deref(), Some("1234567,00"));
        assert_eq!(normalize_budget("12\u{202f}000\u{202f}000 €.").as_deref(), Some("12000000"));
        assert_eq!(normalize_budget(" € "), None);
    }

    #[test]
    fn funding_range_variants() {
        assert_eq!(
            parse_funding_range("3 000 000 to 4 000 000"),
            Some(FundingRange::Range {
                min: "3000000".into(),
                max: "4000000".into()
            })
        );
        assert_eq!(
            parse_funding_range("around 5 000 000"),
            Some(FundingRange::Approx("5 000 000".into()))
        );
        assert_eq!(
            parse_funding_range("See topic conditions"),
            Some(FundingRange::Raw("See topic conditions".into()))
        );
        assert_eq!(parse_funding_range("  "), None);
    }

    #[test]
    fn action_type_from_identifier() {
        assert_eq!(
            parse_action_type("HORIZON-CL4-2024-DIGITAL-EMERGING-01-RIA"),
            Some(ActionType::Ria)
        );
        assert_eq!(
            parse_action_type("HORIZON-MSCA-2024-DN-01-01"),
            Some(ActionType::Msca)
        );
        assert_eq!(parse_action_type("HORIZON-CL5-2024-D3-01-IAX"), None);
        assert_eq!(parse_action_type("no action here"), None);
    }

    #[test]
    fn dates_in_cells() {
        let two = parse_dates("2024-09-18 2025-02-10");
        assert_eq!(
            two,
            vec![
                NaiveDate::from_ymd_opt(2024, 9, 18).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()
            ]
        );
        assert_eq!(
            parse_dates("18 September 2024"),
            vec![NaiveDate::from_ymd_opt(2024, 9, 18).unwrap()]
        );
        assert!(parse_dates("tbc").is_empty());
    }

    #[test]
    fn date_display() {
        let date = NaiveDate::from_ymd_opt(2024, 9, 18).unwrap();
        assert_eq!(display_date(date), "18 SEP 2024");
    }

    #[test]
    fn group_names() {
        assert_eq!(group_name("HORIZON-CL4-D3-2024"), "CL4");
        assert_eq!(group_name("ERC-2025-STG"), "ERC");
    }

    #[test]
    fn option_labels_use_first_text_node() {
        let html = r#"<div class="eui-u-overflow-auto">
            <button class="eui-dropdown-item"><span class="eui-u-pr-s">HORIZON-CL4-2024-D3-01<span class="count">(12)</span></span></button>
            <button class="eui-dropdown-item"><span class="eui-u-pr-s">  </span></button>
            <button class="eui-dropdown-item"><span class="eui-u-pr-s">HORIZON-CL5-2024-D3-01</span></button>
            <button class="eui-dropdown-item"><span class="eui-u-pr-s">HORIZON-CL4-2024-D3-01</span></button>
        </div>"#;
        assert_eq!(
            parse_category_labels(html),
            vec!["HORIZON-CL4-2024-D3-01", "HORIZON-CL5-2024-D3-01"]
        );
    }

    #[test]
    fn card_without_status_gets_placeholder() {
        let html = r#"<sedia-result-card>
            <a class="eui-u-text-link eui-u-font-l eui-u-font-regular" href="/info/funding-tenders/opportunities/portal/screen/opportunities/topic-details/horizon-cl4-2024-d3-01-01">Quantum sensing</a>
            <sedia-result-card-type><span class="ng-star-inserted">HORIZON-CL4-2024-D3-01-01</span></sedia-result-card-type>
        </sedia-result-card>"#;
        let cards = parse_result_cards(html, &origin());
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].status, Extracted::Missing(NO_STATUS));
        assert_eq!(cards[0].status.to_string(), "No status found");
        assert_eq!(
            cards[0].detail_link.as_ref().map(Url::as_str),
            Some("https://ec.europa.eu/info/funding-tenders/opportunities/portal/screen/opportunities/topic-details/horizon-cl4-2024-d3-01-01")
        );
    }

    #[test]
    fn headers_reorder_columns() {
        let headers: Vec<String> = ["Budget (EUR)", "Topic", "Deadline", "Indicative number of grants"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let columns = BudgetColumns::from_headers(&headers);
        assert_eq!(columns.budget, 0);
        assert_eq!(columns.identifier, 1);
        assert_eq!(columns.deadline, 2);
        assert_eq!(columns.accepted, 3);
    }
}
