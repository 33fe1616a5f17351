use std::sync::Arc;

use feedback_protocol::Credentials;

use crate::{
    backend::BackendError,
    client::PortalClient,
    navigation::{Navigation, Route},
    notify::{Notification, Notifier},
};

pub const CREDENTIALS_FALLBACK: &str = "Please check your credentials and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

impl AuthMode {
    fn failure_title(&self) -> &'static str {
        match self {
            AuthMode::SignIn => "Login failed",
            AuthMode::SignUp => "Sign up failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Account exists now; the flow switched to sign-in and holds no session.
    AccountCreated,
    SignedIn(Navigation),
}

/// Email/password form with a sign-in / sign-up toggle.
pub struct LoginFlow {
    client: Arc<PortalClient>,
    notifier: Arc<dyn Notifier>,
    mode: AuthMode,
}

impl LoginFlow {
    pub fn new(client: Arc<PortalClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            notifier,
            mode: AuthMode::SignIn,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        };
    }

    pub fn submit_label(&self) -> &'static str {
        match self.mode {
            AuthMode::SignIn => "Sign In",
            AuthMode::SignUp => "Sign Up",
        }
    }

    pub fn toggle_label(&self) -> &'static str {
        match self.mode {
            AuthMode::SignIn => "Don't have an account? Sign up",
            AuthMode::SignUp => "Already have an account? Sign in",
        }
    }

    /// Runs the current mode. The email is normalized; the password is sent
    /// as typed.
    pub async fn submit(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, BackendError> {
        let credentials = Credentials::normalized(email, password);

        let result = match self.mode {
            AuthMode::SignUp => self
                .client
                .sign_up(&credentials)
                .await
                .map(|_| LoginOutcome::AccountCreated),
            AuthMode::SignIn => self
                .client
                .sign_in(&credentials)
                .await
                .map(|_| LoginOutcome::SignedIn(Navigation::refreshed(Route::Dashboard))),
        };

        match &result {
            Ok(LoginOutcome::AccountCreated) => {
                self.mode = AuthMode::SignIn;
                self.notifier.notify(Notification::info(
                    "Account created!",
                    "You can now log in with your credentials.",
                ));
            }
            Ok(LoginOutcome::SignedIn(_)) => {
                self.notifier.notify(Notification::info(
                    "Welcome back!",
                    "You have successfully logged in.",
                ));
            }
            Err(err) => {
                tracing::error!(error = %err, mode = ?self.mode, "Auth error");
                let message = err.user_message();
                let description = if message.trim().is_empty() {
                    CREDENTIALS_FALLBACK.to_string()
                } else {
                    message
                };
                self.notifier.notify(Notification::destructive(
                    self.mode.failure_title(),
                    description,
                ));
            }
        }

        result
    }
}
