use std::io;

use async_trait::async_trait;
use feedback_protocol::{
    ApiResponse, ChangeEvent, CreateFeedback, Credentials, FeedbackItem, SessionInfo, UserInfo,
};
use futures::{StreamExt, TryStreamExt, future};
use reqwest::{Method, RequestBuilder, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio_util::{codec::FramedRead, io::StreamReader};
use url::Url;

use crate::{
    backend::{AuthBackend, BackendError, FeedbackBackend, Subscription},
    config::PortalConfig,
    sse::{SseCodec, SseFrame},
};

const API_KEY_HEADER: &str = "x-api-token";
const CHANGE_EVENT_NAME: &str = "change";
const BODY_SNIPPET_LEN: usize = 200;

/// reqwest-backed implementation of the backend traits. Cheap to clone; the
/// connection pool is shared between clones.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl HttpBackend {
    pub fn new(config: &PortalConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("feedback-portal/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<RequestBuilder, BackendError> {
        let url = self.base_url.join(path)?;
        let mut rb = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            rb = rb.header(API_KEY_HEADER, key.expose_secret());
        }
        if let Some(token) = token {
            rb = rb.bearer_auth(token);
        }
        Ok(rb)
    }

    fn truncate_body(body: &str) -> &str {
        match body.char_indices().nth(BODY_SNIPPET_LEN) {
            Some((idx, _)) => &body[..idx],
            None => body,
        }
    }

    async fn send_envelope<T: DeserializeOwned>(
        &self,
        rb: RequestBuilder,
    ) -> Result<Option<T>, BackendError> {
        let resp = rb.send().await?;
        let status = resp.status();
        let url = resp.url().clone();
        let body = resp.text().await?;

        let envelope = match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => {
                tracing::warn!(
                    %url,
                    status = status.as_u16(),
                    body = Self::truncate_body(&body),
                    "backend returned an unreadable body"
                );
                return Err(BackendError::Decode(err.to_string()));
            }
            Err(_) => {
                let message = status.canonical_reason().unwrap_or_default().to_string();
                return Err(BackendError::rejected(Some(status.as_u16()), message));
            }
        };

        if !status.is_success() || !envelope.is_success() {
            tracing::debug!(
                %url,
                status = status.as_u16(),
                message = ?envelope.message(),
                "backend refused request"
            );
            let message = envelope.into_result().err().unwrap_or_default();
            return Err(BackendError::rejected(Some(status.as_u16()), message));
        }

        Ok(envelope.data)
    }

    async fn send_json<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, BackendError> {
        self.send_envelope(rb)
            .await?
            .ok_or_else(|| BackendError::Decode("response missing data field".to_string()))
    }

    async fn send_ok(&self, rb: RequestBuilder) -> Result<(), BackendError> {
        self.send_envelope::<serde_json::Value>(rb).await.map(|_| ())
    }

    fn decode_change(frame: SseFrame) -> Option<ChangeEvent> {
        if frame.event.as_deref() != Some(CHANGE_EVENT_NAME) {
            return None;
        }
        match serde_json::from_str::<ChangeEvent>(&frame.data) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed change event");
                None
            }
        }
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn sign_up(&self, credentials: &Credentials) -> Result<UserInfo, BackendError> {
        let rb = self
            .request(Method::POST, "api/auth/sign-up", None)?
            .json(credentials);
        self.send_json(rb).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<SessionInfo, BackendError> {
        let rb = self
            .request(Method::POST, "api/auth/sign-in", None)?
            .json(credentials);
        self.send_json(rb).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), BackendError> {
        let rb = self.request(Method::POST, "api/auth/sign-out", Some(token))?;
        self.send_ok(rb).await
    }

    async fn current_user(&self, token: &str) -> Result<UserInfo, BackendError> {
        let rb = self.request(Method::GET, "api/auth/user", Some(token))?;
        self.send_json(rb).await
    }
}

#[async_trait]
impl FeedbackBackend for HttpBackend {
    async fn list_feedback(&self, token: &str) -> Result<Vec<FeedbackItem>, BackendError> {
        let rb = self.request(Method::GET, "api/feedback", Some(token))?;
        self.send_json(rb).await
    }

    async fn create_feedback(
        &self,
        token: &str,
        payload: &CreateFeedback,
    ) -> Result<FeedbackItem, BackendError> {
        let rb = self
            .request(Method::POST, "api/feedback", Some(token))?
            .json(payload);
        self.send_json(rb).await
    }

    async fn subscribe(&self, token: &str) -> Result<Subscription, BackendError> {
        let resp = self
            .request(Method::GET, "api/feedback/stream", Some(token))?
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
            return Err(BackendError::rejected(Some(status.as_u16()), message));
        }

        let reader = StreamReader::new(resp.bytes_stream().map_err(io::Error::other));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let events = FramedRead::new(reader, SseCodec::new())
            .take_while(|frame| {
                if let Err(err) = frame {
                    tracing::warn!(error = %err, "change stream interrupted");
                }
                future::ready(frame.is_ok())
            })
            .filter_map(|frame| future::ready(frame.ok().and_then(Self::decode_change)))
            .take_until(stop_rx)
            .boxed();

        tracing::debug!("change stream connected");
        Ok(Subscription::new(events, move || {
            let _ = stop_tx.send(());
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, path::Path, time::Duration};

    use futures::StreamExt;
    use local_deployment::LocalDeployment;
    use services::services::config::Config;

    use super::*;

    const PASSWORD: &str = "correct-horse";

    async fn spawn_backend(dir: &Path) -> SocketAddr {
        let config = Config {
            database_url: Some(test_support::sqlite_url(dir)),
            ..Config::default()
        };
        let deployment = LocalDeployment::from_config(config).await.unwrap();
        let app = server::http::router(deployment);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        addr
    }

    fn backend_for(addr: SocketAddr) -> HttpBackend {
        let config = PortalConfig::new(&format!("http://{addr}"), None).unwrap();
        HttpBackend::new(&config).unwrap()
    }

    fn credentials(email: &str) -> Credentials {
        Credentials::normalized(email, PASSWORD)
    }

    #[tokio::test]
    async fn auth_round_trip_against_server() {
        let dir = test_support::temp_dir();
        let backend = backend_for(spawn_backend(dir.path()).await);

        let user = backend.sign_up(&credentials("Http@Example.com")).await.unwrap();
        assert_eq!(user.email, "http@example.com");

        let err = backend
            .sign_up(&credentials("http@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "User already registered");

        let err = backend
            .sign_in(&Credentials::normalized("http@example.com", "nope-nope"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid login credentials");

        let session = backend.sign_in(&credentials("http@example.com")).await.unwrap();
        assert_eq!(session.user.id, user.id);
        assert_eq!(
            backend.current_user(&session.access_token).await.unwrap().id,
            user.id
        );

        backend.sign_out(&session.access_token).await.unwrap();
        let err = backend
            .current_user(&session.access_token)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn created_rows_arrive_on_the_change_stream() {
        let dir = test_support::temp_dir();
        let backend = backend_for(spawn_backend(dir.path()).await);

        backend.sign_up(&credentials("live@example.com")).await.unwrap();
        let session = backend.sign_in(&credentials("live@example.com")).await.unwrap();
        let token = session.access_token.as_str();

        let mut subscription = backend.subscribe(token).await.unwrap();
        let mut events = subscription.take_events().unwrap();

        let created = backend
            .create_feedback(
                token,
                &CreateFeedback {
                    title: "Search is slow".to_string(),
                    description: "Results take ten seconds to appear".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(created.is_pending());

        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("change event within timeout")
            .expect("stream still open");
        match event {
            ChangeEvent::Insert { record } => {
                assert_eq!(record.id, created.id);
                assert_eq!(record.owner_id, session.user.id);
                assert_eq!(record.title, "Search is slow");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let rows = backend.list_feedback(token).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, created.id);

        assert!(subscription.release());
    }

    #[tokio::test]
    async fn server_validation_message_is_surfaced() {
        let dir = test_support::temp_dir();
        let backend = backend_for(spawn_backend(dir.path()).await);

        backend.sign_up(&credentials("short@example.com")).await.unwrap();
        let session = backend.sign_in(&credentials("short@example.com")).await.unwrap();

        let err = backend
            .create_feedback(
                &session.access_token,
                &CreateFeedback {
                    title: "ok".to_string(),
                    description: "Results take ten seconds to appear".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected { status: Some(400), .. }));
        assert_eq!(
            err.user_message(),
            "Title must be between 3 and 200 characters"
        );
    }

    #[tokio::test]
    async fn stream_without_session_is_rejected() {
        let dir = test_support::temp_dir();
        let backend = backend_for(spawn_backend(dir.path()).await);

        let err = backend.subscribe("not-a-token").await.unwrap_err();
        assert!(err.is_unauthorized());
    }
}
