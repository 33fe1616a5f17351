use std::sync::Arc;

use chrono::Utc;
use feedback_protocol::UserInfo;

use crate::{
    auth_button::AuthButton,
    client::PortalClient,
    display::ListView,
    feedback_list::LiveFeedbackList,
    navigation::{Navigation, Route},
    notify::Notifier,
    submission::SubmissionForm,
};

pub enum DashboardLoad {
    /// No usable session.
    Redirect(Navigation),
    Ready(Dashboard),
}

/// The signed-in page: header button, submission form and live list.
pub struct Dashboard {
    pub user: UserInfo,
    pub auth_button: AuthButton,
    pub form: Arc<SubmissionForm>,
    pub list: LiveFeedbackList,
}

impl Dashboard {
    pub async fn load(client: Arc<PortalClient>, notifier: Arc<dyn Notifier>) -> DashboardLoad {
        let Some(user) = client.current_user().await else {
            return DashboardLoad::Redirect(Navigation::to(Route::Login));
        };

        tracing::debug!(user_id = %user.id, "loading dashboard");
        let list = LiveFeedbackList::mount(client.clone(), user.id).await;
        let form = Arc::new(SubmissionForm::new(client.clone(), notifier.clone()));
        let auth_button = AuthButton::new(client, notifier, user.email.clone());

        DashboardLoad::Ready(Self {
            user,
            auth_button,
            form,
            list,
        })
    }

    pub fn list_view(&self) -> ListView {
        ListView::build(&self.list.items(), Utc::now())
    }

    /// Logs out; on success the list is unmounted and the login route
    /// returned. On failure the dashboard is handed back untouched.
    pub async fn logout(self) -> Result<Navigation, Self> {
        match self.auth_button.logout().await {
            Some(navigation) => {
                self.list.unmount();
                Ok(navigation)
            }
            None => Err(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use feedback_protocol::{ChangeEvent, Credentials, FeedbackStatus};

    use super::*;
    use crate::{
        backend::fake::{FakeBackend, row},
        notify::NotificationQueue,
    };

    #[tokio::test]
    async fn redirects_without_session() {
        let client = PortalClient::new(FakeBackend::new());
        let notifier = Arc::new(NotificationQueue::new());

        match Dashboard::load(client, notifier).await {
            DashboardLoad::Redirect(navigation) => assert_eq!(navigation.route, Route::Login),
            DashboardLoad::Ready(_) => panic!("expected redirect"),
        }
    }

    #[tokio::test]
    async fn submission_shows_up_through_the_stream() {
        let backend = FakeBackend::new();
        let client = PortalClient::new(backend.clone());
        let credentials = Credentials::normalized("dash@x.io", "secret1");
        client.sign_up(&credentials).await.unwrap();
        client.sign_in(&credentials).await.unwrap();
        let notifier = Arc::new(NotificationQueue::new());

        let DashboardLoad::Ready(mut dashboard) = Dashboard::load(client, notifier).await else {
            panic!("expected dashboard");
        };
        assert_eq!(dashboard.list_view(), ListView::Empty);

        dashboard.form.set_title("Export to CSV");
        dashboard.form.set_description("Would love a CSV export button");
        let created = dashboard.form.submit().await.unwrap();
        // No optimistic insert: the row appears only once the stream says so.
        assert!(dashboard.list.items().is_empty());

        backend.emit(ChangeEvent::insert(created.clone()));
        tokio::time::timeout(
            Duration::from_secs(2),
            dashboard.list.wait_until(|state| state.len() == 1),
        )
        .await
        .unwrap();

        let mut processed = created.clone();
        processed.status = FeedbackStatus::Processed;
        backend.emit(ChangeEvent::update(processed));
        tokio::time::timeout(
            Duration::from_secs(2),
            dashboard
                .list
                .wait_until(|state| state.items()[0].status == FeedbackStatus::Processed),
        )
        .await
        .unwrap();

        let items = dashboard.list.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, FeedbackStatus::Processed);

        let navigation = dashboard.logout().await.ok().unwrap();
        assert_eq!(navigation, Navigation::refreshed(Route::Login));
        assert_eq!(backend.release_count(), 1);
    }

    #[tokio::test]
    async fn snapshot_excludes_other_owners() {
        let backend = FakeBackend::new();
        let client = PortalClient::new(backend.clone());
        let credentials = Credentials::normalized("mine@x.io", "secret1");
        client.sign_up(&credentials).await.unwrap();
        let session = client.sign_in(&credentials).await.unwrap();
        backend.seed(row(session.user.id, "Mine"));
        backend.seed(row(uuid::Uuid::new_v4(), "Theirs"));

        let DashboardLoad::Ready(dashboard) =
            Dashboard::load(client, Arc::new(NotificationQueue::new())).await
        else {
            panic!("expected dashboard");
        };
        let titles: Vec<_> = dashboard
            .list
            .items()
            .into_iter()
            .map(|item| item.title)
            .collect();
        assert_eq!(titles, vec!["Mine".to_string()]);
    }
}
