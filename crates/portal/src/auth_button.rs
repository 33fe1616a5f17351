use std::sync::Arc;

use crate::{
    client::PortalClient,
    navigation::{Navigation, Route},
    notify::{Notification, Notifier},
};

/// Signed-in email plus the logout action.
pub struct AuthButton {
    client: Arc<PortalClient>,
    notifier: Arc<dyn Notifier>,
    email: String,
}

impl AuthButton {
    pub fn new(client: Arc<PortalClient>, notifier: Arc<dyn Notifier>, email: String) -> Self {
        Self {
            client,
            notifier,
            email,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// `Some` navigation to the login page once the session is gone. On
    /// failure the user stays where they are.
    pub async fn logout(&self) -> Option<Navigation> {
        match self.client.sign_out().await {
            Ok(()) => {
                self.notifier.notify(Notification::info(
                    "Logged out",
                    "You have been successfully logged out.",
                ));
                Some(Navigation::refreshed(Route::Login))
            }
            Err(err) => {
                tracing::error!(error = %err, "Error logging out");
                self.notifier.notify(Notification::destructive(
                    "Logout failed",
                    "There was an error logging out. Please try again.",
                ));
                None
            }
        }
    }
}
