use std::path::Path;

use tempfile::TempDir;

pub fn temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("feedback-test-")
        .tempdir()
        .expect("create temp dir")
}

/// File-backed SQLite URL inside `dir`, created on first connect.
pub fn sqlite_url(dir: &Path) -> String {
    format!(
        "sqlite://{}?mode=rwc",
        dir.join("db.sqlite").to_string_lossy()
    )
}
