pub mod aggregate;
pub mod import;
pub mod normalize;
pub mod report;
pub mod status;

use std::path::{Path, PathBuf};

use crate::store::DEFAULT_DB_FILE;

pub fn resolve_db_path(cache_root: &Path, db_path: Option<&PathBuf>) -> PathBuf {
    db_path
        .cloned()
        .unwrap_or_else(|| cache_root.join(DEFAULT_DB_FILE))
}
