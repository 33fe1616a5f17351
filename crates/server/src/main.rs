use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
};

use anyhow::{self, Error as AnyhowError};
use db::DbErr;
use deployment::{Deployment, DeploymentError};
use server::{DeploymentImpl, http};
use thiserror::Error;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, prelude::*};
use utils::assets::asset_dir;

const GRACEFUL_SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const CLEANUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);
const RETENTION_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum FeedbackServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

fn spawn_background<F>(task: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(task)
}

#[tokio::main]
async fn main() -> Result<(), FeedbackServerError> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},db={level},deployment={level},local_deployment={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string)
        .map_err(|err| anyhow::anyhow!("invalid tracing filter: {err}"))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let assets = asset_dir()?;
    if !assets.exists() {
        std::fs::create_dir_all(&assets)?;
    }

    let deployment = DeploymentImpl::new().await?;

    let retention = deployment.clone();
    spawn_background(async move {
        tracing::info!(
            interval_secs = RETENTION_INTERVAL.as_secs(),
            "Starting session and outbox retention job"
        );
        loop {
            prune_once(&retention).await;
            tokio::time::sleep(RETENTION_INTERVAL).await;
        }
    });

    let app_router = http::router(deployment.clone());

    let (host, port) = {
        let config = deployment.config().read().await;
        (config.host.clone(), config.port)
    };
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!("Server running on http://{host}:{actual_port}");

    let (shutdown_rx, force_exit_rx) = spawn_shutdown_watchers();

    let server = axum::serve(
        listener,
        app_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_watch_true(shutdown_rx.clone()))
    .into_future();
    tokio::pin!(server);

    let serve_result = tokio::select! {
        res = &mut server => res,
        _ = wait_for_watch_true(force_exit_rx.clone()) => {
            tracing::warn!("Force shutdown requested (second signal), exiting immediately");
            std::process::exit(130);
        }
        _ = shutdown_deadline(shutdown_rx.clone(), GRACEFUL_SHUTDOWN_TIMEOUT) => {
            tracing::warn!(
                "Graceful shutdown timed out after {:?}, exiting immediately",
                GRACEFUL_SHUTDOWN_TIMEOUT
            );
            std::process::exit(130);
        }
    };

    serve_result?;

    tokio::select! {
        _ = perform_cleanup_actions(deployment) => {}
        _ = wait_for_watch_true(force_exit_rx.clone()) => {
            tracing::warn!("Force shutdown requested during cleanup, exiting immediately");
            std::process::exit(130);
        }
        _ = tokio::time::sleep(CLEANUP_TIMEOUT) => {
            tracing::warn!("Cleanup timed out after {:?}, exiting immediately", CLEANUP_TIMEOUT);
            std::process::exit(130);
        }
    }

    if *shutdown_rx.borrow() {
        std::process::exit(0);
    }

    Ok(())
}

async fn prune_once(deployment: &DeploymentImpl) {
    match deployment.auth().prune_expired_sessions().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Pruned expired sessions"),
        Err(err) => tracing::warn!(error = %err, "Failed to prune expired sessions"),
    }

    match deployment.events().prune_published().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Pruned published outbox rows"),
        Err(err) => tracing::warn!(error = %err, "Failed to prune outbox"),
    }
}

/// Pushes whatever is still in the outbox to connected streams, then closes
/// the pool.
pub async fn perform_cleanup_actions(deployment: DeploymentImpl) {
    if let Err(err) = deployment.events().flush_pending().await {
        tracing::warn!(error = %err, "Failed to flush outbox before shutdown");
    }
    if let Err(err) = deployment.db().clone().close().await {
        tracing::warn!(error = %err, "Failed to close database cleanly");
    }
}

fn spawn_shutdown_watchers() -> (watch::Receiver<bool>, watch::Receiver<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (force_exit_tx, force_exit_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut shutdown_sent = false;

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::error!("Failed to install SIGINT handler: {e}");
                    return;
                }
            };

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {e}");
                    None
                }
            };

            loop {
                tokio::select! {
                    _ = sigint.recv() => {},
                    _ = async {
                        if let Some(sigterm) = sigterm.as_mut() {
                            sigterm.recv().await;
                        } else {
                            std::future::pending::<()>().await;
                        }
                    } => {},
                }

                if !shutdown_sent {
                    shutdown_sent = true;
                    tracing::info!(
                        "Shutdown signal received, starting graceful shutdown (press Ctrl+C again to force)"
                    );
                    let _ = shutdown_tx.send(true);
                } else {
                    tracing::warn!("Second shutdown signal received, forcing exit");
                    let _ = force_exit_tx.send(true);
                    break;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                return;
            }

            tracing::info!(
                "Shutdown signal received, starting graceful shutdown (press Ctrl+C again to force)"
            );
            let _ = shutdown_tx.send(true);

            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                return;
            }

            tracing::warn!("Second shutdown signal received, forcing exit");
            let _ = force_exit_tx.send(true);
        }
    });

    (shutdown_rx, force_exit_rx)
}

async fn wait_for_watch_true(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }

        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn shutdown_deadline(rx: watch::Receiver<bool>, timeout: std::time::Duration) {
    wait_for_watch_true(rx).await;
    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use db::{DBService, models::event_outbox::EventOutbox};
    use deployment::Deployment;
    use feedback_protocol::{ChangeEvent, CreateFeedback, Credentials};
    use futures::StreamExt;
    use services::services::config::{Config, OutboxConfig};
    use tokio::sync::{oneshot, watch};

    use super::{DeploymentImpl, perform_cleanup_actions, spawn_background, wait_for_watch_true};

    #[tokio::test]
    async fn spawn_background_returns_immediately() {
        let (tx, rx) = oneshot::channel::<()>();

        let start = std::time::Instant::now();
        let handle = spawn_background(async move {
            let _ = rx.await;
        });
        assert!(start.elapsed() < Duration::from_millis(50));

        let _ = tx.send(());
        let _ = handle.await;
    }

    #[tokio::test]
    async fn wait_for_watch_true_resolves_after_flip() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_watch_true(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cleanup_drains_outbox_and_closes_pool() {
        let dir = test_support::temp_dir();
        let database_url = test_support::sqlite_url(dir.path());
        let config = Config {
            database_url: Some(database_url.clone()),
            outbox: OutboxConfig {
                poll_interval_ms: 60_000,
                ..OutboxConfig::default()
            },
            ..Config::default()
        };
        let deployment = DeploymentImpl::from_config(config).await.unwrap();

        let user = deployment
            .auth()
            .sign_up(&Credentials::normalized("cleanup@example.com", "secret1"))
            .await
            .unwrap();
        let mut changes = deployment.events().subscribe(user.id);
        let item = deployment
            .feedback()
            .create(
                user.id,
                &CreateFeedback {
                    title: "Flush on exit".to_string(),
                    description: "Queued before the server stopped".to_string(),
                },
            )
            .await
            .unwrap();

        perform_cleanup_actions(deployment.clone()).await;

        let event = tokio::time::timeout(Duration::from_secs(1), changes.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ChangeEvent::Insert { ref record } if record.id == item.id));
        assert!(deployment.feedback().list_pending(None).await.is_err());

        let reopened = DBService::new(&database_url).await.unwrap();
        let unpublished = EventOutbox::fetch_unpublished(&reopened.pool, 100, 5)
            .await
            .unwrap();
        assert!(unpublished.is_empty());
    }
}
