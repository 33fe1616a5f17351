use secrecy::SecretString;
use url::Url;

use crate::backend::BackendError;

pub const BACKEND_URL_ENV: &str = "FEEDBACK_BACKEND_URL";
pub const API_KEY_ENV: &str = "FEEDBACK_API_KEY";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:3001/";

/// Where the portal finds its backend.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub backend_url: Url,
    pub api_key: Option<SecretString>,
}

impl PortalConfig {
    pub fn new(backend_url: &str, api_key: Option<String>) -> Result<Self, BackendError> {
        // Relative joins keep any path prefix only when the base ends in '/'.
        let mut backend_url = Url::parse(backend_url.trim())?;
        if !backend_url.path().ends_with('/') {
            let path = format!("{}/", backend_url.path());
            backend_url.set_path(&path);
        }

        Ok(Self {
            backend_url,
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .map(SecretString::from),
        })
    }

    pub fn from_env() -> Result<Self, BackendError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BackendError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup(BACKEND_URL_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        Self::new(&backend_url, lookup(API_KEY_ENV))
    }
}
