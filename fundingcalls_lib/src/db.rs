//! SQLite storage for scraped calls, categories and run status.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use fundingcalls_portal::types::{MergedRecord, ProbabilityRate};
use fundingcalls_portal::CallStatus;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("date parse error: {0}")]
    Date(#[from] chrono::ParseError),
    #[error("category '{0}' is not registered")]
    CategoryNotFound(String),
    #[error("invalid run state '{0}'")]
    InvalidRunState(String),
}

pub struct Db {
    conn: Connection,
}

/// A registered call category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A persisted call joined with its category name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredCall {
    pub identifier: String,
    pub action_type: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub budget: Option<String>,
    pub funding_per_project: Option<String>,
    pub opening_date: Option<String>,
    pub deadline_primary: Option<String>,
    pub deadline_secondary: Option<String>,
    pub accepted_projects: Option<String>,
    pub probability_rate: String,
    pub link: Option<String>,
    pub category_id: Option<i64>,
    pub category: Option<String>,
    pub scraped_at: Option<String>,
}

/// Filters for [`Db::query_calls`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    /// Substring of the identifier or title.
    pub search: Option<String>,
    pub statuses: Vec<CallStatus>,
    pub probability: Option<ProbabilityRate>,
    /// Category name, or its group name (e.g. `CL4`).
    pub category: Option<String>,
    pub limit: Option<i64>,
}

/// Counts from one [`Db::upsert_calls`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub stored: usize,
    /// Records without an identifier, which cannot be keyed.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DbError::InvalidRunState(other.to_string())),
        }
    }
}

/// The single run-status row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub run_id: Option<String>,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    value
        .map(|v| DateTime::parse_from_rfc3339(&v).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(DbError::from)
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create any missing tables. Safe to call on every start.
    pub fn init(&self) -> Result<(), DbError> {
        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        self.conn
            .query_row(
                "SELECT value FROM ingest_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO ingest_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Insert the category if it is new; an existing row is never modified.
    /// Returns the category id either way.
    pub fn register_category(&self, name: &str, description: Option<&str>) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO categories (name, description) VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![name, description],
        )?;
        self.category_id(name)?
            .ok_or_else(|| DbError::CategoryNotFound(name.to_string()))
    }

    pub fn category_id(&self, name: &str) -> Result<Option<i64>, DbError> {
        self.conn
            .query_row(
                "SELECT id FROM categories WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Upsert a category's merged records keyed by identifier.
    ///
    /// Each record is written by its own statement, so one bad row does not
    /// roll back the others. Every mutable column is overwritten on conflict.
    pub fn upsert_calls(
        &mut self,
        records: &[MergedRecord],
        category: &str,
    ) -> Result<UpsertSummary, DbError> {
        let category_id = self
            .category_id(category)?
            .ok_or_else(|| DbError::CategoryNotFound(category.to_string()))?;
        let scraped_at = Utc::now().to_rfc3339();
        let mut summary = UpsertSummary::default();

        let mut stmt = self.conn.prepare(
            "INSERT INTO calls (identifier, title, action_type, budget, funding_per_project,
                                deadline_primary, deadline_secondary, opening_date,
                                accepted_projects, probability_rate, link, category_id,
                                status, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(identifier) DO UPDATE SET
               title = excluded.title,
               action_type = excluded.action_type,
               budget = excluded.budget,
               funding_per_project = excluded.funding_per_project,
               deadline_primary = excluded.deadline_primary,
               deadline_secondary = excluded.deadline_secondary,
               opening_date = excluded.opening_date,
               accepted_projects = excluded.accepted_projects,
               probability_rate = excluded.probability_rate,
               link = excluded.link,
               category_id = excluded.category_id,
               status = excluded.status,
               scraped_at = excluded.scraped_at",
        )?;

        for record in records {
            let Some(identifier) = record.identifier.found() else {
                tracing::debug!(category, "Skipping record without identifier");
                summary.skipped += 1;
                continue;
            };
            stmt.execute(params![
                identifier,
                record.title.found(),
                record.action_type.found().map(|a| a.as_str()),
                record.budget.found(),
                record.funding_per_project.found().map(|f| f.to_string()),
                record.deadline_primary.found().map(|d| d.to_string()),
                record.deadline_secondary.map(|d| d.to_string()),
                record.opening_date.map(|d| d.to_string()),
                record.accepted_projects.found(),
                record.probability_rate.as_str(),
                record.link.as_ref().map(|l| l.as_str()),
                category_id,
                record.status.found(),
                scraped_at,
            ])?;
            summary.stored += 1;
        }
        Ok(summary)
    }

    pub fn call_count(&self) -> Result<i64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM calls", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn fetch_all_calls(&self) -> Result<Vec<StoredCall>, DbError> {
        self.query_calls(&CallFilter::default())
    }

    /// Stored calls joined with their category, soonest deadline first.
    pub fn query_calls(&self, filter: &CallFilter) -> Result<Vec<StoredCall>, DbError> {
        let mut sql = String::from(
            "SELECT c.identifier, c.action_type, c.title, c.status, c.budget,
                    c.funding_per_project, c.opening_date, c.deadline_primary,
                    c.deadline_secondary, c.accepted_projects, c.probability_rate,
                    c.link, c.category_id, cat.name, c.scraped_at
             FROM calls c
             LEFT JOIN categories cat ON c.category_id = cat.id
             WHERE 1=1",
        );

        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(ref search) = filter.search {
            sql.push_str(&format!(
                " AND (c.identifier LIKE ?{n} OR c.title LIKE ?{n})",
                n = param_idx
            ));
            params_vec.push(Box::new(format!("%{}%", search)));
            param_idx += 1;
        }
        if !filter.statuses.is_empty() {
            let placeholders: Vec<String> = filter
                .statuses
                .iter()
                .map(|status| {
                    params_vec.push(Box::new(status.label().to_string()));
                    let p = format!("UPPER(?{})", param_idx);
                    param_idx += 1;
                    p
                })
                .collect();
            sql.push_str(&format!(
                " AND UPPER(c.status) IN ({})",
                placeholders.join(", ")
            ));
        }
        if let Some(probability) = filter.probability {
            sql.push_str(&format!(" AND c.probability_rate = ?{}", param_idx));
            params_vec.push(Box::new(probability.as_str().to_string()));
            param_idx += 1;
        }
        if let Some(ref category) = filter.category {
            sql.push_str(&format!(
                " AND (cat.name = ?{n} OR cat.description = ?{n})",
                n = param_idx
            ));
            params_vec.push(Box::new(category.clone()));
            param_idx += 1;
        }

        sql.push_str(
            " ORDER BY c.deadline_primary IS NULL, c.deadline_primary, c.identifier",
        );

        if let Some(n) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        let _ = param_idx;

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(StoredCall {
                identifier: row.get(0)?,
                action_type: row.get(1)?,
                title: row.get(2)?,
                status: row.get(3)?,
                budget: row.get(4)?,
                funding_per_project: row.get(5)?,
                opening_date: row.get(6)?,
                deadline_primary: row.get(7)?,
                deadline_secondary: row.get(8)?,
                accepted_projects: row.get(9)?,
                probability_rate: row.get(10)?,
                link: row.get(11)?,
                category_id: row.get(12)?,
                category: row.get(13)?,
                scraped_at: row.get(14)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Claim the run-status row for `run_id`.
    ///
    /// A single conditional UPDATE, so two callers can never both claim it.
    /// Returns false when another run already holds it.
    pub fn begin_run(&self, run_id: &str) -> Result<bool, DbError> {
        let claimed = self.conn.execute(
            "UPDATE run_status
             SET run_id = ?1, state = 'running', started_at = ?2,
                 finished_at = NULL, message = NULL
             WHERE id = 1 AND state != 'running'",
            params![run_id, Utc::now().to_rfc3339()],
        )?;
        Ok(claimed == 1)
    }

    /// Release the run-status row held by `run_id`.
    pub fn finish_run(
        &self,
        run_id: &str,
        state: RunState,
        message: Option<&str>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE run_status
             SET state = ?2, finished_at = ?3, message = ?4
             WHERE id = 1 AND run_id = ?1",
            params![run_id, state.as_str(), Utc::now().to_rfc3339(), message],
        )?;
        if updated == 0 {
            tracing::warn!("Run {} no longer owns the run status", run_id);
        }
        Ok(())
    }

    pub fn run_status(&self) -> Result<RunStatus, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT run_id, state, started_at, finished_at, message
                 FROM run_status WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((run_id, state, started_at, finished_at, message)) = row else {
            return Ok(RunStatus {
                run_id: None,
                state: RunState::Idle,
                started_at: None,
                finished_at: None,
                message: None,
            });
        };
        Ok(RunStatus {
            run_id,
            state: state.parse()?,
            started_at: parse_timestamp(started_at)?,
            finished_at: parse_timestamp(finished_at)?,
            message,
        })
    }

    /// Force the run status back to idle, e.g. after a crashed run.
    pub fn reset_run_status(&self) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE run_status
             SET state = 'idle', finished_at = ?1, message = 'reset'
             WHERE id = 1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use fundingcalls_portal::types::{
        ActionType, Extracted, FundingRange, NO_BUDGET, NO_IDENTIFIER, NO_STATUS,
    };
    use url::Url;

    use super::*;

    fn open_test_db() -> Db {
        let db = Db::open_in_memory().expect("open in-memory db");
        db.init().expect("init schema");
        db
    }

    fn record(identifier: &str, budget: &str, accepted: &str) -> MergedRecord {
        MergedRecord {
            identifier: Extracted::Found(identifier.to_string()),
            action_type: Extracted::Found(ActionType::Ria),
            title: Extracted::Found("Next generation sensing".to_string()),
            status: Extracted::Found("Open For Submission".to_string()),
            budget: Extracted::Found(budget.to_string()),
            funding_per_project: Extracted::Found(FundingRange::Range {
                min: "3000000".into(),
                max: "4000000".into(),
            }),
            opening_date: NaiveDate::from_ymd_opt(2024, 5, 7),
            deadline_primary: Extracted::Found(NaiveDate::from_ymd_opt(2024, 9, 18).unwrap()),
            deadline_secondary: None,
            accepted_projects: Extracted::Found(accepted.to_string()),
            probability_rate: ProbabilityRate::from_accepted(Some(accepted)),
            link: Url::parse("https://ec.europa.eu/topic/1").ok(),
        }
    }

    fn has_column(db: &Db, table: &str, column: &str) -> bool {
        let sql = format!("PRAGMA table_info({})", table);
        let mut stmt = db.conn.prepare(&sql).expect("prepare pragma");
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query")
            .filter_map(|r| r.ok())
            .collect();
        names.contains(&column.to_string())
    }

    #[test]
    fn init_is_repeatable() {
        let db = open_test_db();
        db.init().expect("second init");
        let version: i32 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        assert!(has_column(&db, "calls", "status"));
    }

    #[test]
    fn register_category_never_overwrites() {
        let db = open_test_db();
        let first = db.register_category("HORIZON-CL4-2024-D3-01", Some("CL4")).unwrap();
        let second = db
            .register_category("HORIZON-CL4-2024-D3-01", Some("changed"))
            .unwrap();
        assert_eq!(first, second);
        let categories = db.list_categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].description.as_deref(), Some("CL4"));
    }

    #[test]
    fn upsert_twice_keeps_one_row_with_latest_values() {
        let mut db = open_test_db();
        db.register_category("CL4", None).unwrap();

        db.upsert_calls(&[record("HORIZON-CL4-2024-D3-01-01", "1000000", "2")], "CL4")
            .unwrap();
        db.upsert_calls(&[record("HORIZON-CL4-2024-D3-01-01", "2500000", "5")], "CL4")
            .unwrap();

        assert_eq!(db.call_count().unwrap(), 1);
        let calls = db.fetch_all_calls().unwrap();
        assert_eq!(calls[0].budget.as_deref(), Some("2500000"));
        assert_eq!(calls[0].probability_rate, "High");
        assert_eq!(calls[0].action_type.as_deref(), Some("RIA"));
        assert_eq!(calls[0].funding_per_project.as_deref(), Some("Min: 3000000 Max: 4000000"));
        assert_eq!(calls[0].category.as_deref(), Some("CL4"));
    }

    #[test]
    fn unknown_category_fails_batch() {
        let mut db = open_test_db();
        let err = db
            .upsert_calls(&[record("HORIZON-CL4-2024-D3-01-01", "1", "1")], "CL9")
            .unwrap_err();
        assert!(matches!(err, DbError::CategoryNotFound(ref c) if c == "CL9"));
        assert_eq!(db.call_count().unwrap(), 0);
    }

    #[test]
    fn records_without_identifier_are_skipped() {
        let mut db = open_test_db();
        db.register_category("CL4", None).unwrap();
        let mut keyless = record("x", "1", "1");
        keyless.identifier = Extracted::Missing(NO_IDENTIFIER);
        let mut partial = record("HORIZON-CL4-2024-D3-01-02", "1", "1");
        partial.status = Extracted::Missing(NO_STATUS);
        partial.budget = Extracted::Missing(NO_BUDGET);

        let summary = db.upsert_calls(&[keyless, partial], "CL4").unwrap();
        assert_eq!(summary, UpsertSummary { stored: 1, skipped: 1 });

        let calls = db.fetch_all_calls().unwrap();
        assert_eq!(calls[0].status, None);
        assert_eq!(calls[0].budget, None);
    }

    #[test]
    fn query_filters_combine() {
        let mut db = open_test_db();
        db.register_category("HORIZON-CL4-2024-D3-01", Some("CL4")).unwrap();
        db.register_category("HORIZON-CL5-2024-D3-01", Some("CL5")).unwrap();

        let mut closed = record("HORIZON-CL5-2024-D3-01-07", "1", "1");
        closed.status = Extracted::Found("Closed".to_string());
        db.upsert_calls(
            &[
                record("HORIZON-CL4-2024-D3-01-01", "1", "4"),
                record("HORIZON-CL4-2024-D3-01-02", "1", "3"),
            ],
            "HORIZON-CL4-2024-D3-01",
        )
        .unwrap();
        db.upsert_calls(&[closed], "HORIZON-CL5-2024-D3-01").unwrap();

        let by_group = db
            .query_calls(&CallFilter {
                category: Some("CL4".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_group.len(), 2);

        let open_high = db
            .query_calls(&CallFilter {
                statuses: vec![CallStatus::Open],
                probability: Some(ProbabilityRate::High),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(open_high.len(), 1);
        assert_eq!(open_high[0].identifier, "HORIZON-CL4-2024-D3-01-01");

        let closed_only = db
            .query_calls(&CallFilter {
                statuses: vec![CallStatus::Closed],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(closed_only.len(), 1);

        let searched = db
            .query_calls(&CallFilter {
                search: Some("d3-01-02".into()),
                limit: Some(5),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(searched.len(), 1);
    }

    #[test]
    fn run_status_is_claimed_once() {
        let db = open_test_db();
        assert_eq!(db.run_status().unwrap().state, RunState::Idle);

        assert!(db.begin_run("run-a").unwrap());
        assert!(!db.begin_run("run-b").unwrap());
        let status = db.run_status().unwrap();
        assert!(status.is_running());
        assert_eq!(status.run_id.as_deref(), Some("run-a"));

        db.finish_run("run-a", RunState::Completed, None).unwrap();
        let status = db.run_status().unwrap();
        assert_eq!(status.state, RunState::Completed);
        assert!(status.finished_at.is_some());

        assert!(db.begin_run("run-b").unwrap());
        db.reset_run_status().unwrap();
        assert_eq!(db.run_status().unwrap().state, RunState::Idle);
    }

    #[test]
    fn meta_roundtrip() {
        let db = open_test_db();
        assert_eq!(db.get_meta("last_run").unwrap(), None);
        db.set_meta("last_run", "2024-09-18T10:00:00Z").unwrap();
        db.set_meta("last_run", "2024-09-19T10:00:00Z").unwrap();
        assert_eq!(
            db.get_meta("last_run").unwrap().as_deref(),
            Some("2024-09-19T10:00:00Z")
        );
    }
}
