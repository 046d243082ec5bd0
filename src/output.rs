use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `value` as pretty JSON via temp file + rename, so readers never see a
/// half-written report.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("Failed to create temp file in {}", parent_dir.display()))?;

    temp_file.write_all(json.as_bytes())?;
    temp_file.flush()?;

    // On Windows the handle must be closed before the rename
    let temp_path = temp_file.into_temp_path();
    temp_path
        .persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Current time in RFC3339 format
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_json_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(&path, "stale").unwrap();

        write_json_atomic(&path, &json!({ "totalSize": "2GB 1MB" })).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["totalSize"], "2GB 1MB");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
