use anyhow::Result;
use chrono::NaiveDate;
use fundingcalls_lib::db::Category;
use fundingcalls_lib::parse::{display_date, group_name};
use fundingcalls_lib::types::{
    NO_ACTION, NO_BUDGET, NO_DEADLINE, NO_FUNDING, NO_LINK, NO_STATUS, NO_SUBMISSION, NO_TITLE,
};
use fundingcalls_lib::{CategoryOutcome, RunReport, RunStatus, StoredCall};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Markdown,
}

#[derive(Tabled, Serialize)]
struct CallRow {
    #[tabled(rename = "Identifier")]
    #[serde(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Action")]
    #[serde(rename = "Action")]
    action_type: String,
    #[tabled(rename = "Title")]
    #[serde(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    #[serde(rename = "Status")]
    status: String,
    #[tabled(rename = "Budget")]
    #[serde(rename = "Budget")]
    budget: String,
    #[tabled(rename = "Funding/Project")]
    #[serde(rename = "Funding/Project")]
    funding_per_project: String,
    #[tabled(rename = "Opening")]
    #[serde(rename = "Opening")]
    opening_date: String,
    #[tabled(rename = "Deadline")]
    #[serde(rename = "Deadline")]
    deadline_primary: String,
    #[tabled(rename = "2nd Deadline")]
    #[serde(rename = "2nd Deadline")]
    deadline_secondary: String,
    #[tabled(rename = "Accepted")]
    #[serde(rename = "Accepted")]
    accepted_projects: String,
    #[tabled(rename = "Probability")]
    #[serde(rename = "Probability")]
    probability_rate: String,
    #[tabled(rename = "Category")]
    #[serde(rename = "Category")]
    category: String,
    #[tabled(rename = "Link")]
    #[serde(rename = "Link")]
    link: String,
}

#[derive(Tabled, Serialize)]
struct OutcomeRow {
    #[tabled(rename = "Category")]
    #[serde(rename = "Category")]
    category: String,
    #[tabled(rename = "Result")]
    #[serde(rename = "Result")]
    result: String,
    #[tabled(rename = "Stored")]
    #[serde(rename = "Stored")]
    stored: usize,
    #[tabled(rename = "Pages")]
    #[serde(rename = "Pages")]
    pages: usize,
    #[tabled(rename = "Detail")]
    #[serde(rename = "Detail")]
    detail: String,
}

#[derive(Tabled, Serialize)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    #[serde(rename = "Category")]
    name: String,
    #[tabled(rename = "Group")]
    #[serde(rename = "Group")]
    group: String,
}

#[derive(Tabled, Serialize)]
struct StatusRow {
    #[tabled(rename = "State")]
    #[serde(rename = "State")]
    state: String,
    #[tabled(rename = "Run")]
    #[serde(rename = "Run")]
    run_id: String,
    #[tabled(rename = "Started")]
    #[serde(rename = "Started")]
    started_at: String,
    #[tabled(rename = "Finished")]
    #[serde(rename = "Finished")]
    finished_at: String,
    #[tabled(rename = "Message")]
    #[serde(rename = "Message")]
    message: String,
}

// -- Row builders --

fn or_placeholder(value: &Option<String>, placeholder: &str) -> String {
    value.clone().unwrap_or_else(|| placeholder.to_string())
}

/// Stored ISO dates shown as `18 SEP 2024`; anything unparseable is shown as stored.
fn format_date(value: &Option<String>, placeholder: &str) -> String {
    match value {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(display_date)
            .unwrap_or_else(|_| raw.clone()),
        None => placeholder.to_string(),
    }
}

fn build_call_rows(calls: &[StoredCall]) -> Vec<CallRow> {
    calls
        .iter()
        .map(|c| CallRow {
            identifier: c.identifier.clone(),
            action_type: or_placeholder(&c.action_type, NO_ACTION),
            title: or_placeholder(&c.title, NO_TITLE),
            status: or_placeholder(&c.status, NO_STATUS),
            budget: or_placeholder(&c.budget, NO_BUDGET),
            funding_per_project: or_placeholder(&c.funding_per_project, NO_FUNDING),
            opening_date: format_date(&c.opening_date, ""),
            deadline_primary: format_date(&c.deadline_primary, NO_DEADLINE),
            deadline_secondary: format_date(&c.deadline_secondary, ""),
            accepted_projects: or_placeholder(&c.accepted_projects, NO_SUBMISSION),
            probability_rate: c.probability_rate.clone(),
            category: c.category.clone().unwrap_or_default(),
            link: or_placeholder(&c.link, NO_LINK),
        })
        .collect()
}

fn build_outcome_rows(report: &RunReport) -> Vec<OutcomeRow> {
    report
        .categories
        .iter()
        .map(|(category, outcome)| match outcome {
            CategoryOutcome::Persisted {
                stored,
                skipped,
                pages,
            } => OutcomeRow {
                category: category.clone(),
                result: "persisted".to_string(),
                stored: *stored,
                pages: *pages,
                detail: if *skipped > 0 {
                    format!("{} without identifier", skipped)
                } else {
                    String::new()
                },
            },
            CategoryOutcome::Skipped { reason } => OutcomeRow {
                category: category.clone(),
                result: "skipped".to_string(),
                stored: 0,
                pages: 0,
                detail: reason.clone(),
            },
            CategoryOutcome::Failed { reason } => OutcomeRow {
                category: category.clone(),
                result: "failed".to_string(),
                stored: 0,
                pages: 0,
                detail: reason.clone(),
            },
        })
        .collect()
}

fn build_category_rows(categories: &[Category]) -> Vec<CategoryRow> {
    categories
        .iter()
        .map(|c| CategoryRow {
            name: c.name.clone(),
            group: c.description.clone().unwrap_or_default(),
        })
        .collect()
}

fn build_category_name_rows(names: &[String]) -> Vec<CategoryRow> {
    names
        .iter()
        .map(|name| CategoryRow {
            name: name.clone(),
            group: group_name(name),
        })
        .collect()
}

fn build_status_row(status: &RunStatus) -> StatusRow {
    StatusRow {
        state: status.state.to_string(),
        run_id: status.run_id.clone().unwrap_or_default(),
        started_at: status
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default(),
        finished_at: status
            .finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default(),
        message: status.message.clone().unwrap_or_default(),
    }
}

fn print_rows<T: Tabled + Serialize>(rows: Vec<T>, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Markdown => {
            let mut table = Table::new(rows);
            table.with(Style::markdown());
            println!("{}", table);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            for row in rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        OutputFormat::Json => print_json(&rows),
    }
    Ok(())
}

// -- Calls --

pub fn print_calls(calls: &[StoredCall], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&calls);
            Ok(())
        }
        _ => print_rows(build_call_rows(calls), format),
    }
}

// -- Categories --

pub fn print_categories(categories: &[Category], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&categories);
            Ok(())
        }
        _ => print_rows(build_category_rows(categories), format),
    }
}

pub fn print_category_names(names: &[String], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&names);
            Ok(())
        }
        _ => print_rows(build_category_name_rows(names), format),
    }
}

// -- Run report and status --

pub fn print_report(report: &RunReport, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(report);
            Ok(())
        }
        _ => print_rows(build_outcome_rows(report), format),
    }
}

pub fn print_status(status: &RunStatus, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(status);
            Ok(())
        }
        _ => print_rows(vec![build_status_row(status)], format),
    }
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}
