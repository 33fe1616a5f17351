use serde::{Deserialize, Serialize};
use strum_macros::EnumString;
use ts_rs::TS;

pub const CURRENT_CONFIG_VERSION: &str = "v1";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 7;
const MIN_SESSION_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Default)]
#[ts(use_ts_enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AccessControlMode {
    #[default]
    Disabled,
    Token,
}

/// Project key gate in front of the public API.
#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct AccessControlConfig {
    pub mode: AccessControlMode,
    pub token: Option<String>,
    #[serde(alias = "allowLocalhostBypass")]
    pub allow_localhost_bypass: bool,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            mode: AccessControlMode::Disabled,
            token: None,
            allow_localhost_bypass: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(alias = "jwtSecret")]
    pub jwt_secret: Option<String>,
    #[serde(alias = "sessionTtlSecs")]
    pub session_ttl_secs: Option<i64>,
}

/// Credentials for the external classification workflow.
#[derive(Clone, Debug, Default, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct WorkflowConfig {
    pub token: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct OutboxConfig {
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(alias = "batchLimit")]
    pub batch_limit: u64,
    #[serde(alias = "maxAttempts")]
    pub max_attempts: i32,
    #[serde(alias = "retentionSecs")]
    pub retention_secs: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            batch_limit: 100,
            max_attempts: 5,
            retention_secs: 60 * 60 * 24,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "configVersion")]
    pub config_version: String,
    pub host: String,
    pub port: u16,
    #[serde(alias = "databaseUrl")]
    pub database_url: Option<String>,
    pub auth: AuthConfig,
    #[serde(alias = "accessControl")]
    pub access_control: AccessControlConfig,
    pub workflow: WorkflowConfig,
    pub outbox: OutboxConfig,
}

impl Config {
    pub fn from_raw(raw_config: &str) -> Self {
        match serde_json::from_str::<Config>(raw_config) {
            Ok(config) => config.normalized(),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config (line {}, column {}): {}, using default",
                    e.line(),
                    e.column(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Layers `FEEDBACK_*`, `HOST`, `PORT` and `DATABASE_URL` on top of the
    /// file values. Unparseable numbers keep the current value.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("FEEDBACK_PORT").or_else(|| lookup("PORT")) {
            match port.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(err) => tracing::warn!(value = %port, error = %err, "Invalid PORT; ignoring"),
            }
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(secret) = lookup("FEEDBACK_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(ttl) = lookup("FEEDBACK_SESSION_TTL_SECS") {
            match ttl.parse::<i64>() {
                Ok(ttl) => self.auth.session_ttl_secs = Some(ttl),
                Err(err) => tracing::warn!(
                    value = %ttl,
                    error = %err,
                    "Invalid FEEDBACK_SESSION_TTL_SECS; ignoring"
                ),
            }
        }
        if let Some(key) = lookup("FEEDBACK_API_KEY") {
            self.access_control.mode = AccessControlMode::Token;
            self.access_control.token = Some(key);
        }
        if let Some(token) = lookup("FEEDBACK_WORKFLOW_TOKEN") {
            self.workflow.token = Some(token);
        }

        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.config_version = CURRENT_CONFIG_VERSION.to_string();

        if self.host.trim().is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }

        for value in [
            &mut self.database_url,
            &mut self.auth.jwt_secret,
            &mut self.access_control.token,
            &mut self.workflow.token,
        ] {
            if matches!(value.as_deref(), Some(v) if v.trim().is_empty()) {
                *value = None;
            }
        }

        if matches!(self.auth.session_ttl_secs, Some(ttl) if ttl < MIN_SESSION_TTL_SECS) {
            tracing::warn!(
                "Session TTL below {MIN_SESSION_TTL_SECS}s, resetting to default"
            );
            self.auth.session_ttl_secs = None;
        }

        let defaults = OutboxConfig::default();
        if self.outbox.poll_interval_ms == 0 {
            self.outbox.poll_interval_ms = defaults.poll_interval_ms;
        }
        if self.outbox.batch_limit == 0 {
            self.outbox.batch_limit = defaults.batch_limit;
        }
        if self.outbox.max_attempts <= 0 {
            self.outbox.max_attempts = defaults.max_attempts;
        }

        self
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.auth.session_ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CURRENT_CONFIG_VERSION.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: None,
            auth: AuthConfig::default(),
            access_control: AccessControlConfig::default(),
            workflow: WorkflowConfig::default(),
            outbox: OutboxConfig::default(),
        }
    }
}
