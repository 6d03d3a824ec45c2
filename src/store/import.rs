use std::io::Read;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info, warn};

use super::SheetTable;

/// Lowercase, drop `(...)` suffixes such as `Cost(¥)`, keep letters and digits.
pub fn normalize_header(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for character in raw.trim_start_matches('\u{feff}').chars() {
        match character {
            '(' | '（' => depth += 1,
            ')' | '）' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ if character.is_alphanumeric() => normalized.extend(character.to_lowercase()),
            _ => {}
        }
    }
    normalized
}

/// Column index per CSV header, `None` for headers the sheet does not know.
fn map_headers(sheet: SheetTable, headers: &csv::StringRecord) -> Vec<Option<usize>> {
    headers
        .iter()
        .map(|header| {
            let key = normalize_header(header);
            sheet.columns().iter().position(|column| {
                normalize_header(column.name) == key || column.aliases.contains(&key.as_str())
            })
        })
        .collect()
}

/// Loads a CSV export of one sheet; returns the number of rows written.
pub fn import_csv<R: Read>(
    connection: &mut Connection,
    sheet: SheetTable,
    reader: R,
    replace: bool,
) -> Result<usize> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .context("failed to read CSV header")?
        .clone();
    let mapping = map_headers(sheet, &headers);
    if mapping.iter().all(Option::is_none) {
        bail!(
            "no CSV header matches a {} column (expected some of: {})",
            sheet.table_name(),
            sheet.column_list()
        );
    }
    for (header, target) in headers.iter().zip(&mapping) {
        if target.is_none() {
            warn!(table = sheet.table_name(), header, "ignoring unknown CSV column");
        }
    }

    let column_count = sheet.columns().len();
    let placeholders = (1..=column_count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<String>>()
        .join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        sheet.table_name(),
        sheet.column_list()
    );

    let transaction = connection
        .transaction()
        .context("failed to start import transaction")?;
    if replace {
        transaction
            .execute(&format!("DELETE FROM {}", sheet.table_name()), [])
            .with_context(|| format!("failed to clear {}", sheet.table_name()))?;
    }

    let mut written = 0usize;
    {
        let mut statement = transaction
            .prepare(&insert_sql)
            .context("failed to prepare import statement")?;
        for (line, record) in csv_reader.records().enumerate() {
            let record = record.with_context(|| format!("failed to read CSV row {}", line + 2))?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                debug!(row = line + 2, "skipping blank CSV row");
                continue;
            }

            let mut cells = vec![String::new(); column_count];
            for (value, target) in record.iter().zip(&mapping) {
                if let Some(index) = target {
                    cells[*index] = if sheet.columns()[*index].verbatim {
                        value.trim_end().to_string()
                    } else {
                        value.trim().to_string()
                    };
                }
            }
            statement
                .execute(params_from_iter(cells.iter()))
                .with_context(|| format!("failed to insert CSV row {}", line + 2))?;
            written += 1;
        }
    }
    transaction
        .commit()
        .context("failed to commit import transaction")?;

    info!(table = sheet.table_name(), rows = written, replace, "imported CSV");
    Ok(written)
}
