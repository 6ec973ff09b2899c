//! Full-replace JSON snapshot of the latest query result

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::LogQueryError;
use crate::model::QueryResult;

/// Where the snapshot lands unless settings say otherwise
pub const DEFAULT_SNAPSHOT_PATH: &str = "logs.json";

/// Pretty-printed JSON of the whole result
///
/// Shape: `{"tables": [{"name", "columns": [{"name", "type"}], "rows": [[...]]}]}`.
/// Cell kinds map to JSON natively; timestamps become RFC 3339 strings and
/// opaque values their text.
pub fn to_pretty_json(result: &QueryResult) -> Result<Vec<u8>, LogQueryError> {
    Ok(serde_json::to_vec_pretty(result)?)
}

/// Write the snapshot to `path`, replacing any previous one
///
/// The document goes to a sibling temp file first and is renamed into place,
/// so readers never see a partial snapshot.
pub fn write_snapshot(path: &Path, result: &QueryResult) -> Result<(), LogQueryError> {
    let data = to_pretty_json(result)?;
    let tmp = temp_path(path);
    let target = path.display().to_string();

    debug!(path = %tmp.display(), bytes = data.len(), "Writing snapshot temp file");
    fs::write(&tmp, &data).map_err(|e| LogQueryError::io(&target, e))?;

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(LogQueryError::io(&target, e));
    }

    info!(
        path = %target,
        tables = result.tables.len(),
        rows = result.row_count(),
        "Snapshot written"
    );
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
