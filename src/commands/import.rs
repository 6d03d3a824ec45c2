use std::fs::File;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ImportArgs;
use crate::commands::resolve_db_path;
use crate::store::Store;
use crate::store::import::import_csv;

pub fn run(args: ImportArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    let sheet = args.table.sheet();

    info!(
        table = args.table.as_str(),
        csv = %args.csv.display(),
        db = %db_path.display(),
        replace = args.replace,
        "starting import"
    );

    let file = File::open(&args.csv)
        .with_context(|| format!("failed to open {}", args.csv.display()))?;
    let mut store = Store::open(&db_path)?;
    let written = import_csv(store.connection_mut(), sheet, file, args.replace)?;
    let total = store.count_rows(sheet.table_name())?;

    info!(
        table = sheet.table_name(),
        written,
        total,
        "import complete"
    );
    Ok(())
}
