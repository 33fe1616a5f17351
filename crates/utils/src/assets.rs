use std::{io, path::PathBuf};

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const ASSET_DIR_ENV: &str = "FEEDBACK_ASSET_DIR";

/// Directory holding the SQLite database and the optional config file.
///
/// `FEEDBACK_ASSET_DIR` wins when set. Debug builds fall back to `dev_assets/`
/// at the workspace root, release builds to the platform data directory.
pub fn asset_dir() -> io::Result<PathBuf> {
    let path = match std::env::var(ASSET_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ if cfg!(debug_assertions) => PathBuf::from(PROJECT_ROOT).join("../../dev_assets"),
        _ => ProjectDirs::from("dev", "feedback", "feedback-portal")
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?
            .data_dir()
            .to_path_buf(),
    };

    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }

    Ok(path)
}

pub fn config_path() -> io::Result<PathBuf> {
    Ok(asset_dir()?.join("config.json"))
}
