use std::sync::Arc;

use anyhow::Error as AnyhowError;
use async_trait::async_trait;
use db::{DBService, DbErr};
use services::services::{
    auth::AuthService,
    config::{Config, ConfigError},
    events::EventService,
    feedback::FeedbackService,
};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

/// Everything a request handler can reach. Implementations are cheap to clone
/// and shared across the router as state.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Arc<RwLock<Config>>;

    fn db(&self) -> &DBService;

    fn auth(&self) -> &AuthService;

    fn feedback(&self) -> &FeedbackService;

    fn events(&self) -> &EventService;
}
