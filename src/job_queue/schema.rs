//! Database schema for jobs.db.
//!
//! Version 0 only tracked statuses. Version 1 persists the template id and
//! attributes so unfinished jobs can be replayed after a restart; rows written
//! under version 0 keep both columns NULL.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP_MS};
use anyhow::{Context, Result};
use rusqlite::Connection;

pub const JOB_STATUS_TABLE_NAME: &str = "job_status";

const JOB_STATUS_TABLE_V0: Table = Table {
    name: JOB_STATUS_TABLE_NAME,
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("request_id", &SqlType::Text, non_null = true),
        sqlite_column!("cid", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP_MS)
        ),
        sqlite_column!("updated_at", &SqlType::Integer),
    ],
    indices: &[("idx_job_status_status_created", "status, created_at")],
    unique_constraints: &[&["request_id"]],
};

const JOB_STATUS_TABLE_V1: Table = Table {
    name: JOB_STATUS_TABLE_NAME,
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("request_id", &SqlType::Text, non_null = true),
        sqlite_column!("cid", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP_MS)
        ),
        sqlite_column!("updated_at", &SqlType::Integer),
        sqlite_column!("attributes", &SqlType::Text),
        sqlite_column!("template_id", &SqlType::Text),
    ],
    indices: &[("idx_job_status_status_created", "status, created_at")],
    unique_constraints: &[&["request_id"]],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    for name in ["attributes", "template_id"] {
        let column = JOB_STATUS_TABLE_V1
            .column(name)
            .with_context(|| format!("Missing column definition for {}", name))?;
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {}",
                JOB_STATUS_TABLE_NAME,
                column.definition()
            ),
            [],
        )?;
    }
    Ok(())
}

pub const JOB_STATUS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[JOB_STATUS_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[JOB_STATUS_TABLE_V1],
        migration: Some(migrate_v0_to_v1),
    },
];
