use anyhow::{Context, Result};
use rusqlite::Connection;

use super::SheetTable;

pub fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    for sheet in SheetTable::ALL {
        let cells = sheet
            .columns()
            .iter()
            .map(|column| format!("{} TEXT NOT NULL DEFAULT ''", column.name))
            .collect::<Vec<String>>()
            .join(",\n  ");
        connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  row_id INTEGER PRIMARY KEY,\n  {cells}\n);",
                sheet.table_name()
            ))
            .with_context(|| format!("failed to create table {}", sheet.table_name()))?;
    }

    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS report_runs (
              run_id TEXT PRIMARY KEY,
              status TEXT NOT NULL,
              title TEXT NOT NULL,
              started_at TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              dry_run INTEGER NOT NULL DEFAULT 0,
              prompt_sha256 TEXT NOT NULL,
              failure_reason TEXT,
              manifest_json TEXT NOT NULL
            );
            ",
        )
        .context("failed to create report_runs table")?;

    Ok(())
}
