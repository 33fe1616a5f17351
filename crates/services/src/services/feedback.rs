use db::{DBService, DbErr, TransactionTrait, models::feedback::Feedback};
use feedback_protocol::{
    ClassifyFeedback, CreateFeedback, FeedbackItem, SubmissionError, validate_submission,
};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_PENDING_LIMIT: u64 = 50;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error(transparent)]
    Validation(#[from] SubmissionError),
    #[error("Feedback not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] DbErr),
}

#[derive(Clone)]
pub struct FeedbackService {
    db: DBService,
}

impl FeedbackService {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }

    /// Stores a new `Pending` row for `owner_id`. Title and description are
    /// validated again here; the portal form is not trusted.
    pub async fn create(
        &self,
        owner_id: Uuid,
        data: &CreateFeedback,
    ) -> Result<FeedbackItem, FeedbackError> {
        validate_submission(&data.title, &data.description)?;

        let tx = self.db.pool.begin().await?;
        let item = Feedback::create(&tx, owner_id, data, Uuid::new_v4()).await?;
        tx.commit().await?;

        tracing::info!(feedback_id = %item.id, %owner_id, "feedback submitted");
        Ok(item)
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<FeedbackItem>, FeedbackError> {
        Ok(Feedback::find_by_owner(&self.db.pool, owner_id).await?)
    }

    pub async fn list_pending(&self, limit: Option<u64>) -> Result<Vec<FeedbackItem>, FeedbackError> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PENDING_LIMIT);
        Ok(Feedback::find_pending(&self.db.pool, limit).await?)
    }

    pub async fn classify(
        &self,
        id: Uuid,
        data: &ClassifyFeedback,
    ) -> Result<FeedbackItem, FeedbackError> {
        let tx = self.db.pool.begin().await?;
        let item = Feedback::classify(&tx, id, data)
            .await?
            .ok_or(FeedbackError::NotFound)?;
        tx.commit().await?;

        tracing::info!(
            feedback_id = %id,
            status = %item.status,
            category = ?item.category,
            priority = ?item.priority,
            "feedback classified"
        );
        Ok(item)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), FeedbackError> {
        let tx = self.db.pool.begin().await?;
        let removed = Feedback::delete(&tx, id).await?;
        if removed == 0 {
            return Err(FeedbackError::NotFound);
        }
        tx.commit().await?;

        tracing::info!(feedback_id = %id, "feedback deleted");
        Ok(())
    }
}
