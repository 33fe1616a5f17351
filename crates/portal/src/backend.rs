use std::fmt;

use async_trait::async_trait;
use feedback_protocol::{ChangeEvent, CreateFeedback, Credentials, FeedbackItem, SessionInfo, UserInfo};
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend answered and refused. `message` is its text, verbatim.
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },
    #[error("Failed to reach the backend: {0}")]
    Transport(String),
    #[error("Unexpected backend response: {0}")]
    Decode(String),
    #[error("Not signed in")]
    NoSession,
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}

impl BackendError {
    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        BackendError::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Message fit for showing to the user. Upstream refusals are passed
    /// through as-is, which may be empty.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            BackendError::NoSession | BackendError::Rejected { status: Some(401), .. }
        )
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, credentials: &Credentials) -> Result<UserInfo, BackendError>;
    async fn sign_in(&self, credentials: &Credentials) -> Result<SessionInfo, BackendError>;
    async fn sign_out(&self, token: &str) -> Result<(), BackendError>;
    async fn current_user(&self, token: &str) -> Result<UserInfo, BackendError>;
}

#[async_trait]
pub trait FeedbackBackend: Send + Sync {
    /// The session owner's rows, newest first.
    async fn list_feedback(&self, token: &str) -> Result<Vec<FeedbackItem>, BackendError>;
    async fn create_feedback(
        &self,
        token: &str,
        payload: &CreateFeedback,
    ) -> Result<FeedbackItem, BackendError>;
    /// Opens the session owner's change stream.
    async fn subscribe(&self, token: &str) -> Result<Subscription, BackendError>;
}

pub trait Backend: AuthBackend + FeedbackBackend {}

impl<T: AuthBackend + FeedbackBackend> Backend for T {}

type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// An open change stream plus the hook that closes it upstream.
///
/// The hook runs exactly once: on the first [`Subscription::release`] call or
/// on drop, whichever comes first.
pub struct Subscription {
    events: Option<BoxStream<'static, ChangeEvent>>,
    release: Option<ReleaseHook>,
}

impl Subscription {
    pub fn new<F>(events: BoxStream<'static, ChangeEvent>, on_release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            events: Some(events),
            release: Some(Box::new(on_release)),
        }
    }

    /// Hands out the event stream. The guard keeps ownership of the release
    /// hook.
    pub fn take_events(&mut self) -> Option<BoxStream<'static, ChangeEvent>> {
        self.events.take()
    }

    /// Returns `true` only for the call that actually released.
    pub fn release(&mut self) -> bool {
        self.events = None;
        match self.release.take() {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("has_events", &self.events.is_some())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use chrono::Utc;
    use feedback_protocol::FeedbackStatus;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    struct Inner {
        users: HashMap<String, (UserInfo, String)>,
        sessions: HashMap<String, UserInfo>,
        rows: Vec<FeedbackItem>,
        listeners: Vec<mpsc::UnboundedSender<ChangeEvent>>,
        fail_next_create: bool,
        fail_list: bool,
        fail_sign_out: bool,
    }

    /// In-memory backend. Change events are pushed by the test through
    /// [`FakeBackend::emit`].
    #[derive(Default)]
    pub struct FakeBackend {
        inner: Mutex<Inner>,
        pub subscribes: AtomicUsize,
        pub releases: Arc<AtomicUsize>,
        pub creates: AtomicUsize,
        pub create_gate: tokio::sync::Notify,
        pub gate_creates: std::sync::atomic::AtomicBool,
    }

    impl FakeBackend {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn emit(&self, event: ChangeEvent) {
            let mut inner = self.inner.lock().unwrap();
            inner.listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }

        pub fn seed(&self, row: FeedbackItem) {
            self.inner.lock().unwrap().rows.push(row);
        }

        pub fn fail_next_create(&self) {
            self.inner.lock().unwrap().fail_next_create = true;
        }

        pub fn fail_list(&self) {
            self.inner.lock().unwrap().fail_list = true;
        }

        pub fn fail_sign_out(&self) {
            self.inner.lock().unwrap().fail_sign_out = true;
        }

        pub fn release_count(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }

        fn user_for(&self, token: &str) -> Result<UserInfo, BackendError> {
            self.inner
                .lock()
                .unwrap()
                .sessions
                .get(token)
                .cloned()
                .ok_or_else(|| BackendError::rejected(Some(401), "Invalid or expired session"))
        }
    }

    pub fn row(owner_id: Uuid, title: &str) -> FeedbackItem {
        let now = Utc::now();
        FeedbackItem {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_string(),
            description: format!("{title} description"),
            category: None,
            priority: None,
            status: FeedbackStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl AuthBackend for FakeBackend {
        async fn sign_up(&self, credentials: &Credentials) -> Result<UserInfo, BackendError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.users.contains_key(&credentials.email) {
                return Err(BackendError::rejected(Some(422), "User already registered"));
            }
            let user = UserInfo {
                id: Uuid::new_v4(),
                email: credentials.email.clone(),
                created_at: Utc::now(),
            };
            inner.users.insert(
                credentials.email.clone(),
                (user.clone(), credentials.password.clone()),
            );
            Ok(user)
        }

        async fn sign_in(&self, credentials: &Credentials) -> Result<SessionInfo, BackendError> {
            let mut inner = self.inner.lock().unwrap();
            let user = match inner.users.get(&credentials.email) {
                Some((user, password)) if *password == credentials.password => user.clone(),
                _ => return Err(BackendError::rejected(Some(400), "Invalid login credentials")),
            };
            let token = Uuid::new_v4().to_string();
            inner.sessions.insert(token.clone(), user.clone());
            Ok(SessionInfo {
                access_token: token,
                token_type: "bearer".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
                user,
            })
        }

        async fn sign_out(&self, token: &str) -> Result<(), BackendError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_sign_out {
                return Err(BackendError::Transport("connection reset".to_string()));
            }
            inner.sessions.remove(token);
            Ok(())
        }

        async fn current_user(&self, token: &str) -> Result<UserInfo, BackendError> {
            self.user_for(token)
        }
    }

    #[async_trait]
    impl FeedbackBackend for FakeBackend {
        async fn list_feedback(&self, token: &str) -> Result<Vec<FeedbackItem>, BackendError> {
            let user = self.user_for(token)?;
            let inner = self.inner.lock().unwrap();
            if inner.fail_list {
                return Err(BackendError::Transport("timed out".to_string()));
            }
            let mut rows: Vec<_> = inner
                .rows
                .iter()
                .filter(|row| row.owner_id == user.id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        }

        async fn create_feedback(
            &self,
            token: &str,
            payload: &CreateFeedback,
        ) -> Result<FeedbackItem, BackendError> {
            let user = self.user_for(token)?;
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.gate_creates.load(Ordering::SeqCst) {
                self.create_gate.notified().await;
            }
            let mut inner = self.inner.lock().unwrap();
            if std::mem::take(&mut inner.fail_next_create) {
                return Err(BackendError::Transport("connection refused".to_string()));
            }
            let mut item = row(user.id, &payload.title);
            item.description = payload.description.clone();
            inner.rows.push(item.clone());
            Ok(item)
        }

        async fn subscribe(&self, token: &str) -> Result<Subscription, BackendError> {
            self.user_for(token)?;
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            self.inner.lock().unwrap().listeners.push(tx);
            let releases = self.releases.clone();
            Ok(Subscription::new(
                UnboundedReceiverStream::new(rx).boxed(),
                move || {
                    releases.fetch_add(1, Ordering::SeqCst);
                },
            ))
        }
    }
}
