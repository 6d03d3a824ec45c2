use std::collections::BTreeSet;

use anyhow::{Result, bail};
use tracing::info;

use crate::cli::AggregateArgs;
use crate::commands::resolve_db_path;
use crate::pipeline::period::aggregate_weekly;
use crate::store::Store;
use crate::store::load::{load_raw, replace_weekly};

pub fn run(args: AggregateArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    let mut store = Store::open(&db_path)?;

    let raw = load_raw(store.connection())?;
    if raw.is_empty() {
        bail!("raw_data is empty; import daily rows first");
    }

    let weekly = aggregate_weekly(&raw);
    let written = replace_weekly(store.connection_mut(), &weekly)?;
    let weeks = weekly
        .iter()
        .map(|row| row.period_start)
        .collect::<BTreeSet<_>>();

    info!(
        raw_rows = raw.len(),
        weekly_rows = written,
        weeks = weeks.len(),
        first_week = %weeks.first().map(ToString::to_string).unwrap_or_default(),
        last_week = %weeks.last().map(ToString::to_string).unwrap_or_default(),
        "aggregated daily rows"
    );
    Ok(())
}
