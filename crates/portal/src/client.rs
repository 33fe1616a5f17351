use std::sync::{Arc, OnceLock, RwLock};

use feedback_protocol::{CreateFeedback, Credentials, FeedbackItem, SessionInfo, UserInfo};

use crate::{
    backend::{Backend, BackendError, Subscription},
    config::PortalConfig,
    http::HttpBackend,
};

static SHARED: OnceLock<Arc<PortalClient>> = OnceLock::new();

/// Backend handle plus the signed-in session. One per process, shared by
/// every component through an `Arc`.
pub struct PortalClient {
    backend: Arc<dyn Backend>,
    session: RwLock<Option<SessionInfo>>,
}

impl PortalClient {
    pub fn new(backend: Arc<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            session: RwLock::new(None),
        })
    }

    /// The process-wide client. Built from `config` on first call; later
    /// calls return the same instance and ignore their argument.
    pub fn shared(config: &PortalConfig) -> Result<Arc<Self>, BackendError> {
        if let Some(client) = SHARED.get() {
            return Ok(client.clone());
        }
        let client = Self::new(Arc::new(HttpBackend::new(config)?));
        Ok(SHARED.get_or_init(|| client).clone())
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.session
            .read()
            .map(|session| session.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_session(&self, session: Option<SessionInfo>) {
        match self.session.write() {
            Ok(mut slot) => *slot = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    fn token(&self) -> Result<String, BackendError> {
        self.session()
            .map(|session| session.access_token)
            .ok_or(BackendError::NoSession)
    }

    pub async fn sign_up(&self, credentials: &Credentials) -> Result<UserInfo, BackendError> {
        self.backend.sign_up(credentials).await
    }

    /// Stores the session on success.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<SessionInfo, BackendError> {
        let session = self.backend.sign_in(credentials).await?;
        self.set_session(Some(session.clone()));
        tracing::debug!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    /// Forgets the session only once the backend confirmed the sign-out.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let token = self.token()?;
        self.backend.sign_out(&token).await?;
        self.set_session(None);
        Ok(())
    }

    /// `None` when nobody is signed in or the backend no longer accepts the
    /// stored session.
    pub async fn current_user(&self) -> Option<UserInfo> {
        let token = self.token().ok()?;
        match self.backend.current_user(&token).await {
            Ok(user) => Some(user),
            Err(err) => {
                if err.is_unauthorized() {
                    self.set_session(None);
                }
                tracing::debug!(error = %err, "no current user");
                None
            }
        }
    }

    pub async fn list_feedback(&self) -> Result<Vec<FeedbackItem>, BackendError> {
        self.backend.list_feedback(&self.token()?).await
    }

    pub async fn create_feedback(
        &self,
        payload: &CreateFeedback,
    ) -> Result<FeedbackItem, BackendError> {
        self.backend.create_feedback(&self.token()?, payload).await
    }

    pub async fn subscribe(&self) -> Result<Subscription, BackendError> {
        self.backend.subscribe(&self.token()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;

    #[tokio::test]
    async fn session_lifecycle() {
        let backend = FakeBackend::new();
        let client = PortalClient::new(backend.clone());
        let credentials = Credentials::normalized("a@b.co", "secret1");

        assert!(client.current_user().await.is_none());
        assert!(matches!(
            client.list_feedback().await,
            Err(BackendError::NoSession)
        ));

        client.sign_up(&credentials).await.unwrap();
        assert!(client.session().is_none());

        let session = client.sign_in(&credentials).await.unwrap();
        assert_eq!(
            client.current_user().await.map(|user| user.id),
            Some(session.user.id)
        );

        client.sign_out().await.unwrap();
        assert!(client.session().is_none());
        assert!(client.current_user().await.is_none());
    }

    #[tokio::test]
    async fn failed_sign_out_keeps_session() {
        let backend = FakeBackend::new();
        let client = PortalClient::new(backend.clone());
        let credentials = Credentials::normalized("keep@b.co", "secret1");
        client.sign_up(&credentials).await.unwrap();
        client.sign_in(&credentials).await.unwrap();

        backend.fail_sign_out();
        assert!(client.sign_out().await.is_err());
        assert!(client.session().is_some());
    }
}
