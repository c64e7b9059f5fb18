//! libSQL store — async `OutcomeStore` / `TemplateStore` implementation.
//!
//! Supports local file and in-memory databases. Structured sub-objects
//! (categories, hit summaries) are stored as JSON text columns; the log
//! tables are append-only.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::model::{HitSummary, RequestOutcome, ResponseTemplate};
use crate::store::{OutcomeStore, TemplateStore};

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS request_logs (
            request_id TEXT NOT NULL,
            from_email TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            categories TEXT NOT NULL,
            has_new_categories INTEGER NOT NULL,
            has_attachments INTEGER NOT NULL,
            required_docs INTEGER NOT NULL,
            draft_response TEXT NOT NULL,
            processing_time_secs REAL NOT NULL,
            user_id TEXT NOT NULL,
            multiple_drafts_generated INTEGER NOT NULL,
            user_reviewed INTEGER NOT NULL,
            docs_count INTEGER NOT NULL,
            dataset_count INTEGER NOT NULL,
            docs_results TEXT NOT NULL,
            dataset_results TEXT NOT NULL,
            total_docs_retrieved INTEGER NOT NULL,
            retrieval_errors TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_request_logs_created ON request_logs(created_at);
        CREATE INDEX IF NOT EXISTS idx_request_logs_user ON request_logs(user_id);

        CREATE TABLE IF NOT EXISTS response_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL,
            from_email TEXT NOT NULL,
            query TEXT NOT NULL,
            response TEXT NOT NULL,
            categories TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    "#,
}];

/// libSQL persistence backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Outcome database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    version INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at TEXT NOT NULL
                );",
            )
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        let mut rows = self
            .conn
            .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        let current: i64 = match rows
            .next()
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| StorageError::Migration(e.to_string()))?,
            None => 0,
        };

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            self.conn
                .execute_batch(migration.sql)
                .await
                .map_err(|e| {
                    StorageError::Migration(format!("{} failed: {e}", migration.name))
                })?;
            self.conn
                .execute(
                    "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                    params![
                        migration.version,
                        migration.name,
                        Utc::now().to_rfc3339()
                    ],
                )
                .await
                .map_err(|e| StorageError::Migration(e.to_string()))?;
            debug!(version = migration.version, name = migration.name, "Migration applied");
        }
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl OutcomeStore for LibSqlStore {
    async fn record_outcome(&self, outcome: &RequestOutcome) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO request_logs (
                    request_id, from_email, subject, body, categories,
                    has_new_categories, has_attachments, required_docs,
                    draft_response, processing_time_secs, user_id,
                    multiple_drafts_generated, user_reviewed,
                    docs_count, dataset_count, docs_results, dataset_results,
                    total_docs_retrieved, retrieval_errors, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                          ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                params![
                    outcome.request_id.clone(),
                    outcome.from.clone(),
                    outcome.subject.clone(),
                    outcome.body.clone(),
                    to_json(&outcome.categories)?,
                    outcome.has_new_categories as i64,
                    outcome.has_attachments as i64,
                    outcome.required_docs as i64,
                    outcome.draft_response.clone(),
                    outcome.processing_time_secs,
                    outcome.user_id.clone(),
                    outcome.multiple_drafts_generated as i64,
                    outcome.user_reviewed as i64,
                    outcome.docs_count as i64,
                    outcome.dataset_count as i64,
                    to_json(&outcome.docs_results)?,
                    to_json(&outcome.dataset_results)?,
                    outcome.total_docs_retrieved as i64,
                    to_json(&outcome.retrieval_errors)?,
                    outcome.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        debug!(request_id = %outcome.request_id, "Request outcome recorded");
        Ok(())
    }

    async fn recent_outcomes(&self, limit: usize) -> Result<Vec<RequestOutcome>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT request_id, from_email, subject, body, categories,
                        has_new_categories, has_attachments, required_docs,
                        draft_response, processing_time_secs, user_id,
                        multiple_drafts_generated, user_reviewed,
                        docs_count, dataset_count, docs_results, dataset_results,
                        total_docs_retrieved, retrieval_errors, created_at
                 FROM request_logs ORDER BY created_at DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut outcomes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            let get_str = |idx: i32| -> Result<String, StorageError> {
                row.get::<String>(idx)
                    .map_err(|e| StorageError::Query(e.to_string()))
            };
            let get_i64 = |idx: i32| -> Result<i64, StorageError> {
                row.get::<i64>(idx)
                    .map_err(|e| StorageError::Query(e.to_string()))
            };

            outcomes.push(RequestOutcome {
                request_id: get_str(0)?,
                from: get_str(1)?,
                subject: get_str(2)?,
                body: get_str(3)?,
                categories: from_json(&get_str(4)?)?,
                has_new_categories: get_i64(5)? != 0,
                has_attachments: get_i64(6)? != 0,
                required_docs: get_i64(7)? != 0,
                draft_response: get_str(8)?,
                processing_time_secs: row
                    .get::<f64>(9)
                    .map_err(|e| StorageError::Query(e.to_string()))?,
                user_id: get_str(10)?,
                multiple_drafts_generated: get_i64(11)? != 0,
                user_reviewed: get_i64(12)? != 0,
                docs_count: get_i64(13)? as usize,
                dataset_count: get_i64(14)? as usize,
                docs_results: from_json::<Vec<HitSummary>>(&get_str(15)?)?,
                dataset_results: from_json::<Vec<HitSummary>>(&get_str(16)?)?,
                total_docs_retrieved: get_i64(17)? as usize,
                retrieval_errors: from_json(&get_str(18)?)?,
                created_at: parse_datetime(&get_str(19)?),
            });
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl TemplateStore for LibSqlStore {
    async fn store_template(&self, template: &ResponseTemplate) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO response_templates
                    (subject, from_email, query, response, categories, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    template.subject.clone(),
                    template.from.clone(),
                    template.query.clone(),
                    template.response.clone(),
                    to_json(&template.categories)?,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        debug!(subject = %template.subject, "Response template stored");
        Ok(())
    }
}
