use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::resolve_db_path;
use crate::store::runs::latest_run;
use crate::store::{SheetTable, Store};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());

    info!(cache_root = %args.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = Store::open(&db_path)?;
    for sheet in SheetTable::ALL {
        let rows = store.count_rows(sheet.table_name()).unwrap_or(0);
        info!(table = sheet.table_name(), rows, "sheet status");
    }
    let runs = store.count_rows("report_runs").unwrap_or(0);

    match latest_run(store.connection())? {
        Some(latest) => info!(
            runs,
            run_id = %latest.run_id,
            status = %latest.status,
            title = %latest.title,
            updated_at = %latest.updated_at,
            dry_run = latest.dry_run,
            failure_reason = %latest.failure_reason.unwrap_or_default(),
            "latest report run"
        ),
        None => warn!(path = %db_path.display(), "no report runs recorded"),
    }

    Ok(())
}
