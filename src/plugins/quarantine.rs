//! Safe delete: MOVE into a timestamped trash location, never destroy.

use crate::core::error::SmartOpsError;
use crate::core::rpc::ToolResult;
use crate::core::store::OperationLog;
use crate::core::time;
use std::fs;
use std::path::{Path, PathBuf};

/// `<trash_dir>/<stamp>_<basename>`, with `_<n>` appended if that name is
/// already occupied.
pub fn quarantine_path(trash_dir: &Path, stamp: &str, file_name: &str) -> PathBuf {
    let candidate = trash_dir.join(format!("{}_{}", stamp, file_name));
    if fs::symlink_metadata(&candidate).is_err() {
        return candidate;
    }
    (1..)
        .map(|n| trash_dir.join(format!("{}_{}_{}", stamp, file_name, n)))
        .find(|p| fs::symlink_metadata(p).is_err())
        .unwrap_or(candidate)
}

pub fn safe_delete(
    filepath: &str,
    trash_dir: &Path,
    log: &OperationLog,
) -> Result<ToolResult, SmartOpsError> {
    let source = Path::new(filepath);
    if fs::symlink_metadata(source).is_err() {
        return Err(SmartOpsError::NotFound(format!(
            "'{}' does not exist",
            filepath
        )));
    }
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            SmartOpsError::PathError(format!("'{}' has no file name to quarantine", filepath))
        })?;

    fs::create_dir_all(trash_dir)?;
    let stamp = time::file_stamp(&time::now());
    let trash_path = quarantine_path(trash_dir, &stamp, &file_name);

    // rename only: a cross-device move fails instead of degrading to copy+delete
    fs::rename(source, &trash_path).map_err(|e| {
        SmartOpsError::IoError(std::io::Error::new(
            e.kind(),
            format!(
                "failed to move '{}' to '{}': {}",
                filepath,
                trash_path.display(),
                e
            ),
        ))
    })?;

    let trash_str = trash_path.to_string_lossy().to_string();
    log.record(
        "safe_delete",
        serde_json::json!({ "filepath": filepath, "trashPath": trash_str }),
    );
    tracing::info!(filepath, trash_path = %trash_str, "quarantined");

    Ok(ToolResult::ok(format!("Moved to trash: {}", trash_str)).with("recoveryPath", trash_str))
}
