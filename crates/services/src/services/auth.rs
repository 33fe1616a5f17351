use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use db::{
    DBService, DbErr, SqlErr,
    models::{auth_session::AuthSession, user::User},
};
use feedback_protocol::{Credentials, SessionInfo, UserInfo};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use utils_jwt::{JwtError, SessionClaims, decode_session, encode_session};
use uuid::Uuid;

pub const MIN_PASSWORD_CHARS: usize = 6;
pub const TOKEN_TYPE: &str = "bearer";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already registered")]
    UserAlreadyRegistered,
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Password should be at least {MIN_PASSWORD_CHARS} characters")]
    WeakPassword,
    #[error("Unable to validate email address: invalid format")]
    InvalidEmail,
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Token(JwtError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired | JwtError::Invalid(_) | JwtError::Claims => AuthError::InvalidSession,
            JwtError::Signing(_) => AuthError::Token(err),
        }
    }
}

impl From<password_hash::Error> for AuthError {
    fn from(err: password_hash::Error) -> Self {
        AuthError::Hashing(err.to_string())
    }
}

/// Account and session management. Sessions are rows in `auth_sessions`; the
/// bearer token is a signed JWT naming that row.
#[derive(Clone)]
pub struct AuthService {
    db: DBService,
    secret: Arc<SecretString>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(db: DBService, secret: SecretString, session_ttl_secs: i64) -> Self {
        Self {
            db,
            secret: Arc::new(secret),
            session_ttl: Duration::seconds(session_ttl_secs),
        }
    }

    /// Creates an account. No session is issued.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<UserInfo, AuthError> {
        let credentials = Credentials::normalized(&credentials.email, &credentials.password);
        validate_email(&credentials.email)?;
        if credentials.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::WeakPassword);
        }

        if User::find_by_email(&self.db.pool, &credentials.email)
            .await?
            .is_some()
        {
            return Err(AuthError::UserAlreadyRegistered);
        }

        let password_hash = hash_password(credentials.password).await?;
        let user = User::create(&self.db.pool, &credentials.email, &password_hash, Uuid::new_v4())
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    AuthError::UserAlreadyRegistered
                } else {
                    AuthError::Database(err)
                }
            })?;

        tracing::info!(user_id = %user.id, "account created");
        Ok(user.info())
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<SessionInfo, AuthError> {
        let credentials = Credentials::normalized(&credentials.email, &credentials.password);

        let Some(user) = User::find_by_email(&self.db.pool, &credentials.email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(credentials.password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let expires_at = now + self.session_ttl;
        let session = AuthSession::create(&self.db.pool, user.id, Uuid::new_v4(), expires_at).await?;

        let claims = SessionClaims::new(user.id, session.id, now, expires_at);
        let access_token = encode_session(&claims, self.secret.expose_secret().as_bytes())?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "session started");
        Ok(SessionInfo {
            access_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_at,
            user: user.info(),
        })
    }

    /// Revokes the session behind `token`. Revoking twice is not an error.
    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.decode(token)?;
        let revoked = AuthSession::revoke(&self.db.pool, claims.sid).await?;
        tracing::info!(session_id = %claims.sid, revoked, "session ended");
        Ok(())
    }

    /// Resolves a bearer token to its user, rejecting revoked or expired
    /// sessions.
    pub async fn current_user(&self, token: &str) -> Result<UserInfo, AuthError> {
        let claims = self.decode(token)?;

        let session = AuthSession::find_by_id(&self.db.pool, claims.sid)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        if session.user_id != claims.sub || !session.is_active_at(Utc::now()) {
            return Err(AuthError::InvalidSession);
        }

        let user = User::find_by_id(&self.db.pool, claims.sub)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        Ok(user.info())
    }

    pub async fn prune_expired_sessions(&self) -> Result<u64, AuthError> {
        Ok(AuthSession::prune_expired_before(&self.db.pool, Utc::now()).await?)
    }

    fn decode(&self, token: &str) -> Result<SessionClaims, AuthError> {
        Ok(decode_session(token, self.secret.expose_secret().as_bytes())?)
    }
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') || email.contains(' ') {
        return Err(AuthError::InvalidEmail);
    }
    Ok(())
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
        Ok::<_, AuthError>(hash.to_string())
    })
    .await?
}

async fn verify_password(password: String, stored_hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)?;
        Ok::<_, AuthError>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await?
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
