use chrono::NaiveDate;
use fundingcalls_lib::parse::{parse_budget_table, parse_result_cards, parse_total_funding};
use fundingcalls_lib::selectors::PORTAL_ORIGIN;
use fundingcalls_lib::types::{ActionType, Extracted, FundingRange, NO_IDENTIFIER, NO_STATUS};
use url::Url;

const RESULT_CARDS: &str = include_str!("fixtures/result_cards.html");
const TOPIC_BUDGET: &str = include_str!("fixtures/topic_budget.html");
const TOPIC_TOTAL_FUNDING: &str = include_str!("fixtures/topic_total_funding.html");

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn result_cards_from_search_page() {
    let origin = Url::parse(PORTAL_ORIGIN).unwrap();
    let cards = parse_result_cards(RESULT_CARDS, &origin);
    assert_eq!(cards.len(), 3);

    let first = &cards[0];
    assert_eq!(
        first.identifier.found().map(String::as_str),
        Some("HORIZON-CL4-2024-DIGITAL-EMERGING-01-RIA")
    );
    assert_eq!(first.title.to_string(), "Explainable and robust AI for industry");
    assert_eq!(first.status.to_string(), "Open For Submission");
    assert_eq!(
        first.detail_link.as_ref().map(Url::as_str),
        Some("https://ec.europa.eu/info/funding-tenders/opportunities/portal/screen/opportunities/topic-details/horizon-cl4-2024-digital-emerging-01-ria")
    );

    assert_eq!(cards[1].status, Extracted::Missing(NO_STATUS));

    let last = &cards[2];
    assert_eq!(last.identifier.to_string(), NO_IDENTIFIER);
    assert!(last.detail_link.is_none());
    assert_eq!(last.status.to_string(), "Forthcoming");
}

#[test]
fn budget_table_rows() {
    let rows = parse_budget_table(TOPIC_BUDGET);
    assert_eq!(rows.len(), 3);

    let ria = &rows[0];
    assert_eq!(
        ria.identifier.found().map(String::as_str),
        Some("HORIZON-CL4-2024-DIGITAL-EMERGING-01-RIA")
    );
    assert_eq!(ria.action_type, Extracted::Found(ActionType::Ria));
    assert_eq!(ria.budget.to_string(), "40000000");
    assert_eq!(ria.opening_date, Some(date(2024, 5, 7)));
    assert_eq!(ria.deadline_primary, Extracted::Found(date(2024, 9, 18)));
    assert_eq!(ria.deadline_secondary, None);
    assert_eq!(
        ria.funding_per_project,
        Extracted::Found(FundingRange::Range {
            min: "3000000".into(),
            max: "4000000".into()
        })
    );
    assert_eq!(ria.funding_per_project.to_string(), "Min: 3000000 Max: 4000000");

    let csa = &rows[1];
    assert_eq!(csa.action_type, Extracted::Found(ActionType::Csa));
    assert_eq!(csa.budget.to_string(), "5000000");
    assert_eq!(csa.deadline_secondary, Some(date(2025, 2, 10)));
    assert_eq!(
        csa.funding_per_project,
        Extracted::Found(FundingRange::Approx("2 500 000".into()))
    );

    let ia = &rows[2];
    assert_eq!(ia.action_type, Extracted::Found(ActionType::Ia));
    assert_eq!(ia.opening_date, Some(date(2024, 5, 7)));
    assert_eq!(ia.deadline_primary, Extracted::Found(date(2024, 9, 18)));
    assert_eq!(ia.accepted_projects.to_string(), "to be defined");
}

#[test]
fn total_funding_fallback_strips_currency() {
    assert_eq!(
        parse_total_funding(TOPIC_TOTAL_FUNDING).as_deref(),
        Some("1234567,00")
    );
    assert!(parse_budget_table(TOPIC_TOTAL_FUNDING).is_empty());
    assert_eq!(parse_total_funding(TOPIC_BUDGET), None);
}
