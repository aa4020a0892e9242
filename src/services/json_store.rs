use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{LauncherError, Result};

/// Read a JSON-array file, treating a missing or unreadable file as an empty
/// collection. Both ledger and snapshot stores bootstrap this way on first
/// run.
pub(crate) fn load_array<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(value) => value,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            tracing::warn!(
                "failed to read {} (starting empty): {}",
                path.display(),
                err
            );
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(
                "malformed JSON in {} (starting empty): {}",
                path.display(),
                err
            );
            Vec::new()
        }
    }
}

/// Rewrite the whole collection. Writes go through a temp file and a rename
/// so a crash mid-write never leaves a truncated ledger behind.
pub(crate) fn store_array<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_string_pretty(items)?;
    let temp_name = format!(
        "{}.tmp-{}-{}",
        path.file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| "store.json".to_string()),
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, payload)?;
    std::fs::rename(&temp_path, path).map_err(|err| {
        let _ = std::fs::remove_file(&temp_path);
        LauncherError::Storage(format!(
            "failed to finalize {}: {}",
            path.display(),
            err
        ))
    })
}
