use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Email is normalized; the password is passed through untouched.
    pub fn normalized(email: &str, password: &str) -> Self {
        Self {
            email: normalize_email(email),
            password: password.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SessionInfo {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

/// Trims, lowercases and strips zero-width characters left behind by
/// copy-paste.
pub fn normalize_email(raw: &str) -> String {
    raw.chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .collect::<String>()
        .trim()
        .to_lowercase()
}
