use std::{
    path::Path,
    sync::{Mutex, MutexGuard, OnceLock},
};

pub fn test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Variables the deployment reads at startup. Each guard pins or clears all of
/// them and restores the previous values on drop.
const MANAGED_VARS: [&str; 6] = [
    "DATABASE_URL",
    "FEEDBACK_ASSET_DIR",
    "FEEDBACK_CONFIG_PATH",
    "FEEDBACK_API_KEY",
    "FEEDBACK_WORKFLOW_TOKEN",
    "FEEDBACK_JWT_SECRET",
];

pub struct TestEnvGuard {
    _lock: MutexGuard<'static, ()>,
    previous: Vec<(&'static str, Option<String>)>,
}

impl TestEnvGuard {
    pub fn new(temp_root: &Path, db_url: String) -> Self {
        let lock = test_lock().lock().unwrap_or_else(|err| err.into_inner());
        let previous = MANAGED_VARS
            .iter()
            .map(|name| (*name, std::env::var(name).ok()))
            .collect();

        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            for name in MANAGED_VARS {
                std::env::remove_var(name);
            }
            std::env::set_var("FEEDBACK_ASSET_DIR", temp_root);
            std::env::set_var("FEEDBACK_CONFIG_PATH", temp_root.join("config.json"));
            std::env::set_var("DATABASE_URL", db_url);
        }

        Self {
            _lock: lock,
            previous,
        }
    }
}

impl Drop for TestEnvGuard {
    fn drop(&mut self) {
        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            for (name, value) in &self.previous {
                match value {
                    Some(value) => std::env::set_var(name, value),
                    None => std::env::remove_var(name),
                }
            }
        }
    }
}
