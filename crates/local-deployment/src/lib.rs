use std::sync::Arc;

use async_trait::async_trait;
use db::{DBService, default_database_url};
use deployment::{Deployment, DeploymentError};
use secrecy::SecretString;
use services::services::{
    auth::AuthService,
    config::{Config, load_runtime_config, resolve_config_path},
    events::EventService,
    feedback::FeedbackService,
};
use tokio::sync::RwLock;
use utils::change_hub::ChangeHub;
use uuid::Uuid;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<RwLock<Config>>,
    db: DBService,
    auth: AuthService,
    feedback: FeedbackService,
    events: EventService,
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config_path = resolve_config_path()?;
        let config = load_runtime_config(&config_path).await;
        Self::from_config(config).await
    }

    fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn auth(&self) -> &AuthService {
        &self.auth
    }

    fn feedback(&self) -> &FeedbackService {
        &self.feedback
    }

    fn events(&self) -> &EventService {
        &self.events
    }
}

impl LocalDeployment {
    /// Connects the database, runs migrations and starts the outbox worker.
    pub async fn from_config(config: Config) -> Result<Self, DeploymentError> {
        let database_url = match config.database_url.clone() {
            Some(url) => url,
            None => default_database_url()?,
        };
        let db = DBService::new(&database_url).await?;

        let auth = AuthService::new(
            db.clone(),
            Self::jwt_secret(&config),
            config.session_ttl_secs(),
        );
        let feedback = FeedbackService::new(db.clone());
        let events = EventService::new(db.clone(), Arc::new(ChangeHub::new()), config.outbox.clone());

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            db,
            auth,
            feedback,
            events,
        })
    }

    fn jwt_secret(config: &Config) -> SecretString {
        match config.auth.jwt_secret.clone() {
            Some(secret) => SecretString::from(secret),
            None => {
                tracing::warn!(
                    "No JWT secret configured (FEEDBACK_JWT_SECRET); sessions will not survive a restart"
                );
                SecretString::from(format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use services::services::config::Config;

    use super::*;

    #[tokio::test]
    async fn from_config_uses_explicit_database_url() {
        let dir = test_support::temp_dir();
        let config = Config {
            database_url: Some(test_support::sqlite_url(dir.path())),
            ..Config::default()
        };

        let deployment = LocalDeployment::from_config(config).await.unwrap();
        assert!(dir.path().join("db.sqlite").exists());
        assert!(
            deployment
                .feedback()
                .list_pending(None)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
