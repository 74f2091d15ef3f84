//! Job status storage and persistence.
//!
//! The status store is the durable source of truth for jobs. The queue's
//! in-memory list can always be rebuilt from it.

use super::models::{JobCounts, JobRecord, JobStatus, NewJob};
use super::schema::JOB_STATUS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{migrate_if_needed, read_schema_version};
use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const SCHEMA_LABEL: &str = "Job status";

const SELECT_COLUMNS: &str =
    "id, request_id, cid, status, error, template_id, attributes, created_at, updated_at";

/// Durable CRUD over job rows. No scheduling semantics live here.
pub trait JobStatusStore: Send + Sync {
    /// Insert a new pending row.
    /// Returns false, without failing, if a row with the same request id exists.
    fn insert(&self, job: &NewJob) -> Result<bool>;

    /// Get a job by request id.
    fn find_by_id(&self, request_id: &str) -> Result<Option<JobRecord>>;

    /// All pending and processing jobs in FIFO order, optionally excluding one.
    fn find_pending_or_processing(&self, exclude: Option<&str>) -> Result<Vec<JobRecord>>;

    /// Flip every processing row back to pending and return every pending row
    /// in FIFO order. Used once at startup.
    fn find_all_unfinished_and_reset_processing_to_pending(&self) -> Result<Vec<JobRecord>>;

    /// Atomically move a job from `from` to `to`, setting its error and bumping
    /// `updated_at`. Returns false if the job is missing or not in `from`.
    fn update_status(
        &self,
        request_id: &str,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool>;

    /// Remove the given jobs. Returns how many rows were deleted.
    fn delete_many(&self, request_ids: &[String]) -> Result<usize>;

    /// Number of jobs per status.
    fn count_by_status(&self) -> Result<JobCounts>;
}

/// SQLite-backed implementation of [`JobStatusStore`].
#[derive(Clone)]
pub struct SqliteJobStatusStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStatusStore {
    /// Open or create the job status database at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            JOB_STATUS_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new job status database at {:?}", db_path.as_ref());
            conn
        };

        let version = read_schema_version(&conn, JOB_STATUS_VERSIONED_SCHEMAS, SCHEMA_LABEL)
            .context("Failed to read job status database version")?;

        JOB_STATUS_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        migrate_if_needed(&conn, JOB_STATUS_VERSIONED_SCHEMAS, version, SCHEMA_LABEL)?;

        Ok(SqliteJobStatusStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOB_STATUS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteJobStatusStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get a reference to the connection, for tests that need to craft rows.
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let status: String = row.get("status")?;
        Ok(JobRecord {
            seq: row.get("id")?,
            request_id: row.get("request_id")?,
            content_id: row.get("cid")?,
            status: JobStatus::from_db_str(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("unknown job status '{}'", status).into(),
                )
            })?,
            error: row.get("error")?,
            template_id: row.get("template_id")?,
            attributes: row.get("attributes")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn query_unfinished(conn: &Connection, exclude: Option<&str>) -> Result<Vec<JobRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_status
             WHERE status IN ('pending', 'processing') AND request_id IS NOT ?1
             ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![exclude], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl JobStatusStore for SqliteJobStatusStore {
    fn insert(&self, job: &NewJob) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO job_status (request_id, cid, status, template_id, attributes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job.request_id,
                job.content_id,
                JobStatus::Pending.as_db_str(),
                job.template_id,
                job.attributes,
                job.created_at,
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                warn!("Job {} already exists, not inserting", job.request_id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_by_id(&self, request_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM job_status WHERE request_id = ?1",
                    SELECT_COLUMNS
                ),
                params![request_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_pending_or_processing(&self, exclude: Option<&str>) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::query_unfinished(&conn, exclude)
    }

    fn find_all_unfinished_and_reset_processing_to_pending(&self) -> Result<Vec<JobRecord>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let reset = tx.execute(
            "UPDATE job_status SET status = 'pending', updated_at = ?1 WHERE status = 'processing'",
            params![now_millis()],
        )?;
        if reset > 0 {
            info!("Reset {} orphaned processing jobs to pending", reset);
        }
        let records = Self::query_unfinished(&tx, None)?;
        tx.commit()?;
        Ok(records)
    }

    fn update_status(
        &self,
        request_id: &str,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE job_status SET status = ?1, error = ?2, updated_at = ?3
             WHERE request_id = ?4 AND status = ?5",
            params![
                to.as_db_str(),
                error,
                now_millis(),
                request_id,
                from.as_db_str()
            ],
        )?;
        Ok(rows > 0)
    }

    fn delete_many(&self, request_ids: &[String]) -> Result<usize> {
        if request_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; request_ids.len()].join(", ");
        let deleted = conn.execute(
            &format!(
                "DELETE FROM job_status WHERE request_id IN ({})",
                placeholders
            ),
            params_from_iter(request_ids.iter()),
        )?;
        Ok(deleted)
    }

    fn count_by_status(&self) -> Result<JobCounts> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM job_status GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = JobCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as usize;
            match JobStatus::from_db_str(&status) {
                Some(JobStatus::Pending) => counts.pending = count,
                Some(JobStatus::Processing) => counts.processing = count,
                Some(JobStatus::Completed) => counts.completed = count,
                Some(JobStatus::Failed) => counts.failed = count,
                None => warn!("Ignoring {} rows with unknown status '{}'", count, status),
            }
        }
        Ok(counts)
    }
}
