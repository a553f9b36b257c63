use fundingcalls_lib::categories::list_categories;
use fundingcalls_lib::category_select::select_category;
use fundingcalls_lib::filters::apply_filters;
use fundingcalls_lib::pipeline::enumerate_categories;
use fundingcalls_lib::selectors;
use fundingcalls_lib::testing::{fast_config, FakeCard, FakeEvent, FakePortal};
use fundingcalls_lib::types::ProbabilityRate;
use fundingcalls_lib::{
    run_scrape, CallFilter, CallStatus, CategoryOutcome, CategorySelection, Db, DetailStrategy,
    FilterState, PortalSession, RunState, ScrapeError, ScrapeRequest,
};

const TOPIC_BUDGET: &str = include_str!("fixtures/topic_budget.html");
const TOPIC_TOTAL_FUNDING: &str = include_str!("fixtures/topic_total_funding.html");

const RIA: &str = "HORIZON-CL4-2024-DIGITAL-EMERGING-01-RIA";
const CSA: &str = "HORIZON-CL4-2024-DIGITAL-EMERGING-02-CSA";
const IA: &str = "HORIZON-CL4-2024-DIGITAL-EMERGING-03-IA";
const CL4: &str = "HORIZON-CL4-2024-DIGITAL-EMERGING-01";
const CL5: &str = "HORIZON-CL5-2024-D3-01";

fn test_db() -> Db {
    let db = Db::open_in_memory().unwrap();
    db.init().unwrap();
    db
}

fn open_filters() -> FilterState {
    FilterState::new()
        .with_status(CallStatus::Forthcoming)
        .with_status(CallStatus::Open)
}

fn portal() -> FakePortal {
    FakePortal::new()
        .with_categories([CL4, CL5])
        .with_results(
            CL4,
            vec![
                vec![FakeCard::new(RIA), FakeCard::new(CSA).without_status()],
                vec![FakeCard::new(IA)],
            ],
        )
        .with_results(CL5, vec![vec![FakeCard::new("HORIZON-CL5-2024-D3-01-05")]])
        .with_detail(&FakeCard::url_for(RIA), TOPIC_BUDGET)
        .with_detail(&FakeCard::url_for("HORIZON-CL5-2024-D3-01-05"), TOPIC_TOTAL_FUNDING)
}

fn request(categories: &[&str]) -> ScrapeRequest {
    ScrapeRequest {
        filters: open_filters(),
        categories: CategorySelection::Named(categories.iter().map(|c| c.to_string()).collect()),
    }
}

#[tokio::test]
async fn filters_follow_requested_statuses() {
    let portal = FakePortal::new().with_checked(CallStatus::Closed, true);
    let page = portal.primary();
    let config = fast_config();

    apply_filters(&page, &open_filters(), &config).await.unwrap();

    assert!(!portal.is_checked(CallStatus::Closed));
    assert!(portal.is_checked(CallStatus::Forthcoming));
    assert!(portal.is_checked(CallStatus::Open));
    assert!(portal.programme_selected());
}

#[tokio::test]
async fn applying_filters_twice_clicks_nothing_the_second_time() {
    let priors = [
        (false, false, false),
        (true, false, true),
        (true, true, true),
        (false, true, false),
    ];
    for (forthcoming, open, closed) in priors {
        let portal = FakePortal::new()
            .with_checked(CallStatus::Forthcoming, forthcoming)
            .with_checked(CallStatus::Open, open)
            .with_checked(CallStatus::Closed, closed);
        let page = portal.primary();
        let config = fast_config();
        let state = open_filters().with_keyword("quantum");

        apply_filters(&page, &state, &config).await.unwrap();
        let after_first = portal.clicks();
        apply_filters(&page, &state, &config).await.unwrap();

        assert_eq!(portal.clicks(), after_first, "prior state {:?}", (forthcoming, open, closed));
        assert_eq!(portal.keyword().as_deref(), Some("quantum"));
        assert!(portal.is_checked(CallStatus::Open));
        assert!(!portal.is_checked(CallStatus::Closed));
    }
}

#[tokio::test]
async fn empty_status_set_keeps_portal_defaults() {
    let portal = FakePortal::new().with_checked(CallStatus::Closed, true);
    let page = portal.primary();

    apply_filters(&page, &FilterState::new(), &fast_config())
        .await
        .unwrap();

    assert!(portal.is_checked(CallStatus::Closed));
    assert!(!portal
        .events()
        .iter()
        .any(|e| matches!(e, FakeEvent::StatusToggled(..))));
}

#[tokio::test]
async fn categories_collected_across_virtualized_dropdown() {
    let mut names: Vec<String> = (1..=23).map(|i| format!("HORIZON-CL{}-2024-01", i)).collect();
    names.insert(5, "   ".to_string());
    names.insert(9, "HORIZON-CL2-2024-01".to_string());
    let portal = FakePortal::new().with_categories(names).with_window(6);
    let page = portal.primary();

    let labels = list_categories(&page, &fast_config()).await.unwrap();

    assert_eq!(labels.len(), 23);
    assert_eq!(labels.first().map(String::as_str), Some("HORIZON-CL1-2024-01"));
    assert_eq!(labels.last().map(String::as_str), Some("HORIZON-CL23-2024-01"));
    let mut unique = labels.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), labels.len());
    assert!(labels.iter().all(|l| !l.trim().is_empty()));
}

#[tokio::test]
async fn empty_dropdown_gives_no_categories() {
    let portal = FakePortal::new();
    let labels = list_categories(&portal.primary(), &fast_config())
        .await
        .unwrap();
    assert!(labels.is_empty());
}

#[tokio::test]
async fn sequential_categories_dismiss_then_reselect() {
    let portal = FakePortal::new()
        .with_categories(["CL4", "CL5"])
        .with_window(1);
    let page = portal.primary();
    let config = fast_config();
    let mut active = None;

    select_category(&page, "CL4", &mut active, &config).await.unwrap();
    select_category(&page, "CL5", &mut active, &config).await.unwrap();

    let events: Vec<FakeEvent> = portal
        .events()
        .into_iter()
        .filter(|e| !matches!(e, FakeEvent::CallMenuOpened))
        .collect();
    assert_eq!(
        events,
        vec![
            FakeEvent::Selected("CL4".into()),
            FakeEvent::ChipOpened("CL4".into()),
            FakeEvent::Dismissed("CL4".into()),
            FakeEvent::Selected("CL5".into()),
        ]
    );
    assert_eq!(active.as_deref(), Some("CL5"));
    assert_eq!(portal.selected_category().as_deref(), Some("CL5"));
}

#[tokio::test]
async fn missing_dismiss_control_skips_category() {
    let portal = FakePortal::new()
        .with_categories(["CL4", "CL5"])
        .without_dismiss("CL4");
    let page = portal.primary();
    let config = fast_config();
    let mut active = None;

    select_category(&page, "CL4", &mut active, &config).await.unwrap();
    let err = select_category(&page, "CL5", &mut active, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::CategorySkipped { ref category, .. } if category == "CL5"));
    assert!(err.is_category_scoped());
    assert_eq!(active.as_deref(), Some("CL4"));
}

#[tokio::test]
async fn previous_category_without_chip_is_not_dismissed() {
    let portal = FakePortal::new().with_categories(["CL4", "CL5"]);
    let mut active = Some("CL4".to_string());

    select_category(&portal.primary(), "CL5", &mut active, &fast_config())
        .await
        .unwrap();

    assert_eq!(active.as_deref(), Some("CL5"));
    assert!(!portal
        .events()
        .iter()
        .any(|e| matches!(e, FakeEvent::ChipOpened(_) | FakeEvent::Dismissed(_))));
}

#[tokio::test]
async fn selection_reports_cards_shown_before_the_click() {
    let portal = FakePortal::new()
        .with_categories(["CL4"])
        .with_initial_results(vec![vec![FakeCard::new("ALL-1"), FakeCard::new("ALL-2")]])
        .with_results("CL4", vec![vec![FakeCard::new("A-1")]]);
    let mut active = None;

    let shown = select_category(&portal.primary(), "CL4", &mut active, &fast_config())
        .await
        .unwrap();

    assert_eq!(shown, vec!["ALL-1".to_string(), "ALL-2".to_string()]);
}

#[tokio::test]
async fn unknown_option_skips_category() {
    let portal = FakePortal::new().with_categories(["CL4"]);
    let mut active = None;
    let err = select_category(&portal.primary(), "CL9", &mut active, &fast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::CategorySkipped { .. }));
    assert!(active.is_none());
}

#[tokio::test]
async fn full_run_persists_merged_calls() {
    let portal = portal();
    let session = PortalSession::attach(portal.clone(), fast_config())
        .await
        .unwrap();
    let mut db = test_db();

    let report = run_scrape(&session, &mut db, &request(&[CL4, CL5]), None)
        .await
        .unwrap();

    assert_eq!(report.categories.len(), 2);
    assert_eq!(
        report.categories[0].1,
        CategoryOutcome::Persisted {
            stored: 3,
            skipped: 0,
            pages: 2
        }
    );
    assert_eq!(report.stored(), 4);
    assert_eq!(db.call_count().unwrap(), 4);

    let calls = db.fetch_all_calls().unwrap();
    let ria = calls.iter().find(|c| c.identifier == RIA).unwrap();
    assert_eq!(ria.action_type.as_deref(), Some("RIA"));
    assert_eq!(ria.budget.as_deref(), Some("40000000"));
    assert_eq!(ria.probability_rate, "Low");
    assert_eq!(ria.deadline_primary.as_deref(), Some("2024-09-18"));
    assert_eq!(ria.category.as_deref(), Some(CL4));

    let csa = calls.iter().find(|c| c.identifier == CSA).unwrap();
    assert_eq!(csa.status, None);
    assert_eq!(csa.probability_rate, "Medium");

    let fallback = calls
        .iter()
        .find(|c| c.identifier == "HORIZON-CL5-2024-D3-01-05")
        .unwrap();
    assert_eq!(fallback.budget.as_deref(), Some("1234567,00"));
    assert_eq!(fallback.probability_rate, ProbabilityRate::Unknown.as_str());

    let status = db.run_status().unwrap();
    assert_eq!(status.state, RunState::Completed);
    assert_eq!(status.run_id.as_deref(), Some(report.run_id.as_str()));
    assert!(db.get_meta("last_successful_run").unwrap().is_some());

    assert_eq!(portal.opened_pages(), 2);
    assert_eq!(portal.closed_pages(), 2);
    let dismissals = portal
        .events()
        .iter()
        .filter(|e| matches!(e, FakeEvent::Dismissed(_)))
        .count();
    assert_eq!(dismissals, 1);
}

#[tokio::test]
async fn rerun_updates_rows_in_place() {
    let portal = portal();
    let session = PortalSession::attach(portal, fast_config()).await.unwrap();
    let mut db = test_db();

    run_scrape(&session, &mut db, &request(&[CL4]), None)
        .await
        .unwrap();
    run_scrape(&session, &mut db, &request(&[CL4]), None)
        .await
        .unwrap();

    assert_eq!(db.call_count().unwrap(), 3);
    let filter = CallFilter {
        category: Some("CL4".into()),
        ..CallFilter::default()
    };
    assert_eq!(db.query_calls(&filter).unwrap().len(), 3);
}

#[tokio::test]
async fn per_record_strategy_visits_every_card() {
    let portal = portal();
    let mut config = fast_config();
    config.detail_strategy = DetailStrategy::PerRecord;
    let session = PortalSession::attach(portal.clone(), config).await.unwrap();
    let mut db = test_db();

    run_scrape(&session, &mut db, &request(&[CL4]), None)
        .await
        .unwrap();

    assert_eq!(portal.opened_pages(), 3);
    assert_eq!(portal.closed_pages(), 3);
    assert_eq!(db.call_count().unwrap(), 3);
}

#[tokio::test]
async fn skipped_category_does_not_stop_the_run() {
    let portal = portal().without_dismiss(CL4);
    let session = PortalSession::attach(portal, fast_config()).await.unwrap();
    let mut db = test_db();

    let report = run_scrape(&session, &mut db, &request(&[CL4, CL5]), None)
        .await
        .unwrap();

    assert!(report.categories[0].1.is_persisted());
    assert!(matches!(
        report.categories[1].1,
        CategoryOutcome::Skipped { .. }
    ));
    assert_eq!(db.run_status().unwrap().state, RunState::Completed);
}

#[tokio::test]
async fn unknown_requested_category_is_dropped() {
    let session = PortalSession::attach(portal(), fast_config()).await.unwrap();
    let mut db = test_db();

    let report = run_scrape(&session, &mut db, &request(&["HORIZON-XX", CL5]), None)
        .await
        .unwrap();

    assert_eq!(report.categories.len(), 1);
    assert_eq!(report.categories[0].0, CL5);
}

#[tokio::test]
async fn run_is_rejected_while_another_is_active() {
    let session = PortalSession::attach(portal(), fast_config()).await.unwrap();
    let mut db = test_db();
    assert!(db.begin_run("other-run").unwrap());

    let err = run_scrape(&session, &mut db, &request(&[CL4]), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::RunInProgress { ref run_id } if run_id == "other-run"));
    assert_eq!(db.call_count().unwrap(), 0);
    assert!(db.run_status().unwrap().is_running());
}

#[tokio::test]
async fn missing_filter_control_fails_the_run() {
    let portal = portal().hiding(selectors::keyword_input());
    let session = PortalSession::attach(portal, fast_config()).await.unwrap();
    let mut db = test_db();
    let request = ScrapeRequest {
        filters: open_filters().with_keyword("hydrogen"),
        categories: CategorySelection::All,
    };

    let err = run_scrape(&session, &mut db, &request, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::UiElementNotFound { .. }));
    let status = db.run_status().unwrap();
    assert_eq!(status.state, RunState::Failed);
    assert!(status.message.unwrap_or_default().contains("ui element not found"));
    assert_eq!(db.call_count().unwrap(), 0);
}

#[tokio::test]
async fn progress_events_cover_each_category() {
    let session = PortalSession::attach(portal(), fast_config()).await.unwrap();
    let mut db = test_db();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    run_scrape(&session, &mut db, &request(&[CL4, CL5]), Some(&tx))
        .await
        .unwrap();
    drop(tx);

    let mut finished = Vec::new();
    let mut total = None;
    while let Some(event) = rx.recv().await {
        match event {
            fundingcalls_lib::ProgressEvent::CategoriesResolved { total: t } => total = Some(t),
            fundingcalls_lib::ProgressEvent::CategoryFinished { category, .. } => {
                finished.push(category)
            }
            _ => {}
        }
    }
    assert_eq!(total, Some(2));
    assert_eq!(finished, vec![CL4.to_string(), CL5.to_string()]);
}

#[tokio::test]
async fn enumerate_categories_applies_filters_first() {
    let portal = portal();
    let session = PortalSession::attach(portal.clone(), fast_config())
        .await
        .unwrap();

    let labels = enumerate_categories(&session, &open_filters()).await.unwrap();

    assert_eq!(labels, vec![CL4.to_string(), CL5.to_string()]);
    assert!(portal.is_checked(CallStatus::Open));
}

#[tokio::test]
async fn slow_rerender_does_not_leak_unfiltered_cards() {
    let portal = FakePortal::new()
        .with_categories([CL4, CL5])
        .with_initial_results(vec![vec![FakeCard::new("ALL-1"), FakeCard::new("ALL-2")]])
        .with_results(CL4, vec![vec![FakeCard::new("A-1")]])
        .with_results(CL5, vec![vec![FakeCard::new("B-1")]])
        .with_render_lag(3);
    let session = PortalSession::attach(portal, fast_config()).await.unwrap();
    let mut db = test_db();

    run_scrape(&session, &mut db, &request(&[CL4, CL5]), None)
        .await
        .unwrap();

    let in_category = |name: &str| -> Vec<String> {
        let filter = CallFilter {
            category: Some(name.to_string()),
            ..CallFilter::default()
        };
        db.query_calls(&filter)
            .unwrap()
            .into_iter()
            .map(|c| c.identifier)
            .collect()
    };
    assert_eq!(in_category(CL4), vec!["A-1".to_string()]);
    assert_eq!(in_category(CL5), vec!["B-1".to_string()]);
    assert_eq!(db.call_count().unwrap(), 2);
}

#[tokio::test]
async fn missing_cards_on_a_later_page_fail_the_category() {
    let portal = FakePortal::new()
        .with_categories([CL4])
        .with_results(CL4, vec![vec![FakeCard::new(RIA)], vec![]]);
    let session = PortalSession::attach(portal, fast_config()).await.unwrap();
    let mut db = test_db();

    let report = run_scrape(&session, &mut db, &request(&[CL4]), None)
        .await
        .unwrap();

    assert!(matches!(
        report.categories[0].1,
        CategoryOutcome::Failed { .. }
    ));
    assert_eq!(db.call_count().unwrap(), 0);
}
