use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::ReportRunManifest;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub status: String,
    pub title: String,
    pub updated_at: String,
    pub dry_run: bool,
    pub failure_reason: Option<String>,
}

/// Inserts or updates the row for `manifest.run_id`.
pub fn record_run(connection: &Connection, manifest: &ReportRunManifest) -> Result<()> {
    let manifest_json =
        serde_json::to_string(manifest).context("failed to serialize run manifest")?;
    connection
        .execute(
            "
            INSERT INTO report_runs (
              run_id, status, title, started_at, updated_at, dry_run,
              prompt_sha256, failure_reason, manifest_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(run_id) DO UPDATE SET
              status = excluded.status,
              title = excluded.title,
              updated_at = excluded.updated_at,
              prompt_sha256 = excluded.prompt_sha256,
              failure_reason = excluded.failure_reason,
              manifest_json = excluded.manifest_json
            ",
            params![
                manifest.run_id,
                manifest.status,
                manifest.title,
                manifest.started_at,
                manifest.updated_at,
                manifest.dry_run,
                manifest.prompt_sha256,
                manifest.failure_reason,
                manifest_json,
            ],
        )
        .with_context(|| format!("failed to record run {}", manifest.run_id))?;
    Ok(())
}

pub fn latest_run(connection: &Connection) -> Result<Option<RunSummary>> {
    connection
        .query_row(
            "
            SELECT run_id, status, title, updated_at, dry_run, failure_reason
            FROM report_runs
            ORDER BY updated_at DESC, rowid DESC
            LIMIT 1
            ",
            [],
            |row| {
                Ok(RunSummary {
                    run_id: row.get(0)?,
                    status: row.get(1)?,
                    title: row.get(2)?,
                    updated_at: row.get(3)?,
                    dry_run: row.get(4)?,
                    failure_reason: row.get(5)?,
                })
            },
        )
        .optional()
        .context("failed to read latest run")
}
