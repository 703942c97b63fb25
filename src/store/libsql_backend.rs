//! libSQL backend — durable `LeadStore` implementation.
//!
//! Typed lead fields live in their own columns; deployment-specific columns
//! are kept as a JSON object in `extra`, and the set of accepted extra column
//! names is registered in `lead_columns`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::leads::model::{EmailVerified, ProcessingStatus, ResponseStatus};
use crate::leads::{LeadIndex, LeadRecord, LeadUpdate};
use crate::store::migrations;
use crate::store::traits::LeadStore;

const LEAD_COLUMNS: &str = "idx, email, company, industry, contact_number, processing_status, \
    email_verified, response_status, verification_date, outreach_date, notes, extra";

/// libSQL lead store.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlLeadStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlLeadStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db)?;
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Lead store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let store = Self::from_database(db)?;
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Append a lead and return its assigned index.
    ///
    /// Extra columns on the record are registered as known headers.
    pub async fn insert_lead(&self, record: &LeadRecord) -> Result<LeadIndex, DatabaseError> {
        for column in record.extra.keys() {
            self.register_column(column).await?;
        }

        let extra = serde_json::to_string(&record.extra)
            .map_err(|e| DatabaseError::Serialization(format!("lead extra: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO leads (idx, email, company, industry, contact_number, \
                 processing_status, email_verified, response_status, verification_date, \
                 outreach_date, notes, extra) \
                 VALUES ((SELECT COALESCE(MAX(idx) + 1, 0) FROM leads), \
                 ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    opt_text(record.email.as_deref()),
                    opt_text(record.company.as_deref()),
                    opt_text(record.industry.as_deref()),
                    opt_text(record.contact_number.as_deref()),
                    opt_text(record.processing_status.map(|s| s.as_str())),
                    opt_text(record.email_verified.map(|v| v.as_str())),
                    opt_text(record.response_status.as_ref().map(|r| r.as_str())),
                    opt_text(record.verification_date.map(|d| d.to_rfc3339()).as_deref()),
                    opt_text(record.outreach_date.map(|d| d.to_rfc3339()).as_deref()),
                    opt_text(record.notes.as_deref()),
                    extra,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_lead: {e}")))?;

        let index = self.conn.last_insert_rowid() as LeadIndex;
        debug!(lead_index = index, "Lead inserted");
        Ok(index)
    }

    /// Accept `name` as an extra column in future updates.
    pub async fn register_column(&self, name: &str) -> Result<(), DatabaseError> {
        if name.contains('"') {
            return Err(DatabaseError::Constraint(format!(
                "column name may not contain quotes: {name}"
            )));
        }
        self.conn
            .execute(
                "INSERT OR IGNORE INTO lead_columns (name) VALUES (?1)",
                params![name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("register_column: {e}")))?;
        Ok(())
    }

    /// Fetch one lead by index.
    pub async fn get_lead(&self, index: LeadIndex) -> Result<Option<LeadRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE idx = ?1"),
                params![index as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_lead(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn is_known_column(&self, name: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM lead_columns WHERE name = ?1",
                params![name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_known_column: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("is_known_column: {e}"))),
        }
    }

    async fn query_leads(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<LeadRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("query_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => warn!("Skipping lead row: {e}"),
            }
        }
        Ok(leads)
    }
}

#[async_trait]
impl LeadStore for LibSqlLeadStore {
    async fn fetch_all(&self) -> Result<Vec<LeadRecord>, DatabaseError> {
        self.query_leads(
            &format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY idx ASC"),
            Vec::new(),
        )
        .await
    }

    async fn fetch_unprocessed_since(
        &self,
        after: Option<LeadIndex>,
    ) -> Result<Vec<LeadRecord>, DatabaseError> {
        let floor = after.map_or(-1, |mark| mark as i64);
        self.query_leads(
            &format!(
                "SELECT {LEAD_COLUMNS} FROM leads \
                 WHERE idx > ?1 AND (processing_status IS NULL OR processing_status = '') \
                 ORDER BY idx ASC"
            ),
            vec![Value::Integer(floor)],
        )
        .await
    }

    async fn update_fields(
        &self,
        index: LeadIndex,
        update: &LeadUpdate,
    ) -> Result<(), DatabaseError> {
        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let mut set = |assignment: &str, value: Value| {
            values.push(value);
            assignments.push(assignment.replace('?', &format!("?{}", values.len())));
        };

        if let Some(status) = update.processing_status {
            set(
                &format!(
                    "processing_status = CASE WHEN {} THEN ? ELSE processing_status END",
                    status_guard(status)
                ),
                text(status.as_str()),
            );
        }
        if let Some(verdict) = update.email_verified {
            set("email_verified = ?", text(verdict.as_str()));
        }
        if let Some(ref response) = update.response_status {
            set("response_status = ?", text(response.as_str()));
        }
        if let Some(date) = update.verification_date {
            set(
                "verification_date = COALESCE(verification_date, ?)",
                text(&date.to_rfc3339()),
            );
        }
        if let Some(date) = update.outreach_date {
            set(
                "outreach_date = COALESCE(outreach_date, ?)",
                text(&date.to_rfc3339()),
            );
        }
        if let Some(ref notes) = update.notes {
            set("notes = ?", text(notes));
        }

        let mut extra_writes = Vec::new();
        for (column, value) in &update.extra {
            if self.is_known_column(column).await? {
                extra_writes.push((column, value));
            } else {
                warn!(lead_index = index, column = %column, "Column not found in headers, skipping");
            }
        }
        // One json_set call: repeated assignments to `extra` keep only the last.
        if !extra_writes.is_empty() {
            let mut args = Vec::with_capacity(extra_writes.len());
            for (column, value) in extra_writes {
                values.push(text(&format!("$.\"{column}\"")));
                values.push(text(value));
                args.push(format!("?{}, ?{}", values.len() - 1, values.len()));
            }
            assignments.push(format!("extra = json_set(extra, {})", args.join(", ")));
        }

        assignments.push("updated_at = datetime('now')".to_string());
        values.push(Value::Integer(index as i64));
        let sql = format!(
            "UPDATE leads SET {} WHERE idx = ?{}",
            assignments.join(", "),
            values.len()
        );

        let changed = self
            .conn
            .execute(&sql, values)
            .await
            .map_err(|e| DatabaseError::Query(format!("update_fields: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: index.to_string(),
            });
        }
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// SQL condition that holds when the stored status may move to `target`.
fn status_guard(target: ProcessingStatus) -> String {
    let mut conditions = Vec::new();
    if ProcessingStatus::can_transition(None, target) {
        conditions.push("processing_status IS NULL OR processing_status = ''".to_string());
    }
    let from: Vec<String> = ProcessingStatus::ALL
        .into_iter()
        .filter(|s| ProcessingStatus::can_transition(Some(*s), target))
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    if !from.is_empty() {
        conditions.push(format!("processing_status IN ({})", from.join(", ")));
    }
    if conditions.is_empty() {
        return "0".to_string();
    }
    format!("({})", conditions.join(" OR "))
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_lead(row: &libsql::Row) -> Result<LeadRecord, libsql::Error> {
    let idx: i64 = row.get(0)?;
    let status: Option<String> = row.get(5).ok();
    let verified: Option<String> = row.get(6).ok();
    let response: Option<String> = row.get(7).ok();
    let verification_date: Option<String> = row.get(8).ok();
    let outreach_date: Option<String> = row.get(9).ok();
    let extra: String = row.get(11)?;

    Ok(LeadRecord {
        index: idx as LeadIndex,
        email: row.get(1).ok(),
        company: row.get(2).ok(),
        industry: row.get(3).ok(),
        contact_number: row.get(4).ok(),
        processing_status: status.as_deref().and_then(ProcessingStatus::parse),
        email_verified: verified.as_deref().and_then(EmailVerified::parse),
        response_status: response.as_deref().and_then(ResponseStatus::parse),
        verification_date: verification_date.as_deref().and_then(parse_datetime),
        outreach_date: outreach_date.as_deref().and_then(parse_datetime),
        notes: row.get(10).ok(),
        extra: serde_json::from_str(&extra).unwrap_or_default(),
    })
}
