use std::sync::{Arc, Mutex, MutexGuard};

use feedback_protocol::{
    CreateFeedback, FeedbackItem, SubmissionError,
    validation::{DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS},
    validate_submission,
};
use thiserror::Error;

use crate::{
    backend::BackendError,
    client::PortalClient,
    notify::{Notification, Notifier},
};

pub const SUBMITTED_TITLE: &str = "Feedback submitted!";
pub const SUBMITTED_DESCRIPTION: &str =
    "Your feedback is being processed. It will be classified shortly.";
pub const FAILED_TITLE: &str = "Submission failed";
pub const FAILED_DESCRIPTION: &str =
    "There was an error submitting your feedback. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] SubmissionError),
    #[error("A submission is already in progress")]
    InFlight,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Default)]
struct FormInner {
    title: String,
    description: String,
    state: SubmissionState,
}

/// The feedback form. Shareable across tasks; at most one submission is in
/// flight per form.
pub struct SubmissionForm {
    client: Arc<PortalClient>,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<FormInner>,
}

/// Puts the form back to `Failed` if a submission future is dropped before
/// it settles.
struct InFlightGuard<'a> {
    form: &'a SubmissionForm,
    settled: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.form.lock().state = SubmissionState::Failed;
        }
    }
}

impl SubmissionForm {
    pub fn new(client: Arc<PortalClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            notifier,
            inner: Mutex::new(FormInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FormInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.lock().title = title.into();
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.lock().description = description.into();
    }

    pub fn title(&self) -> String {
        self.lock().title.clone()
    }

    pub fn description(&self) -> String {
        self.lock().description.clone()
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state
    }

    pub fn is_submitting(&self) -> bool {
        self.state() == SubmissionState::Submitting
    }

    pub fn title_counter(&self) -> String {
        format!("{}/{}", self.lock().title.chars().count(), TITLE_MAX_CHARS)
    }

    pub fn description_counter(&self) -> String {
        format!(
            "{}/{}",
            self.lock().description.chars().count(),
            DESCRIPTION_MAX_CHARS
        )
    }

    pub fn button_label(&self) -> &'static str {
        if self.is_submitting() {
            "Submitting..."
        } else {
            "Submit Feedback"
        }
    }

    /// Validates locally, then writes one row. Invalid input never reaches
    /// the backend. Fields are cleared on success and kept on failure.
    pub async fn submit(&self) -> Result<FeedbackItem, SubmitError> {
        let payload = {
            let mut inner = self.lock();
            if inner.state == SubmissionState::Submitting {
                return Err(SubmitError::InFlight);
            }
            if let Err(err) = validate_submission(&inner.title, &inner.description) {
                drop(inner);
                tracing::debug!(field = err.field(), "submission blocked by validation");
                self.notifier
                    .notify(Notification::destructive(err.heading(), err.to_string()));
                return Err(err.into());
            }
            inner.state = SubmissionState::Submitting;
            CreateFeedback {
                title: inner.title.clone(),
                description: inner.description.clone(),
            }
        };

        let mut guard = InFlightGuard {
            form: self,
            settled: false,
        };
        let result = self.client.create_feedback(&payload).await;
        guard.settled = true;

        match result {
            Ok(item) => {
                {
                    let mut inner = self.lock();
                    inner.title.clear();
                    inner.description.clear();
                    inner.state = SubmissionState::Done;
                }
                tracing::info!(feedback_id = %item.id, "feedback submitted");
                self.notifier
                    .notify(Notification::info(SUBMITTED_TITLE, SUBMITTED_DESCRIPTION));
                Ok(item)
            }
            Err(err) => {
                self.lock().state = SubmissionState::Failed;
                tracing::error!(error = %err, "Error submitting feedback");
                self.notifier
                    .notify(Notification::destructive(FAILED_TITLE, FAILED_DESCRIPTION));
                Err(err.into())
            }
        }
    }
}
