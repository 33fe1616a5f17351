use chrono::Utc;
use feedback_protocol::{
    ClassifyFeedback, CreateFeedback, FeedbackCategory, FeedbackItem, FeedbackPriority,
    FeedbackStatus,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    entities::feedback,
    events::{
        ENTITY_FEEDBACK, EVENT_FEEDBACK_CREATED, EVENT_FEEDBACK_DELETED, EVENT_FEEDBACK_UPDATED,
        FeedbackEventPayload,
    },
    models::{event_outbox::EventOutbox, ids},
};

/// Query and mutation entry points for feedback rows. Every mutation records a
/// matching outbox entry on the same connection, so callers that pass a
/// transaction get the row write and its change event atomically.
pub struct Feedback;

impl Feedback {
    fn into_item(model: feedback::Model, owner_id: Uuid) -> FeedbackItem {
        FeedbackItem {
            id: model.uuid,
            owner_id,
            title: model.title,
            description: model.description,
            category: model.category.as_deref().map(FeedbackCategory::from_label),
            priority: model.priority.as_deref().map(FeedbackPriority::from_label),
            status: FeedbackStatus::from_label(&model.status),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: feedback::Model,
    ) -> Result<FeedbackItem, DbErr> {
        let owner_id = ids::user_uuid_by_id(db, model.owner_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Owner not found".to_string()))?;
        Ok(Self::into_item(model, owner_id))
    }

    async fn enqueue_change<C: ConnectionTrait>(
        db: &C,
        event_type: &str,
        feedback_id: Uuid,
        owner_id: Uuid,
    ) -> Result<(), DbErr> {
        let payload = serde_json::to_value(FeedbackEventPayload {
            feedback_id,
            owner_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, event_type, ENTITY_FEEDBACK, feedback_id, payload).await
    }

    /// Rows owned by `owner_id`, newest first. Unknown owners have no rows.
    pub async fn find_by_owner<C: ConnectionTrait>(
        db: &C,
        owner_id: Uuid,
    ) -> Result<Vec<FeedbackItem>, DbErr> {
        let Some(owner_row_id) = ids::user_id_by_uuid(db, owner_id).await? else {
            return Ok(Vec::new());
        };

        let models = feedback::Entity::find()
            .filter(feedback::Column::OwnerId.eq(owner_row_id))
            .order_by_desc(feedback::Column::CreatedAt)
            .order_by_desc(feedback::Column::Id)
            .all(db)
            .await?;

        Ok(models
            .into_iter()
            .map(|model| Self::into_item(model, owner_id))
            .collect())
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<FeedbackItem>, DbErr> {
        let record = feedback::Entity::find()
            .filter(feedback::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Oldest pending rows first, for the classification workflow to pick up.
    pub async fn find_pending<C: ConnectionTrait>(
        db: &C,
        limit: u64,
    ) -> Result<Vec<FeedbackItem>, DbErr> {
        let models = feedback::Entity::find()
            .filter(feedback::Column::Status.eq(FeedbackStatus::Pending.to_string()))
            .order_by_asc(feedback::Column::CreatedAt)
            .order_by_asc(feedback::Column::Id)
            .limit(limit)
            .all(db)
            .await?;

        let mut items = Vec::with_capacity(models.len());
        for model in models {
            items.push(Self::from_model(db, model).await?);
        }
        Ok(items)
    }

    /// Inserts a new `Pending` row with no classification.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        owner_id: Uuid,
        data: &CreateFeedback,
        feedback_id: Uuid,
    ) -> Result<FeedbackItem, DbErr> {
        let owner_row_id = ids::user_id_by_uuid(db, owner_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Owner not found".to_string()))?;

        let now = Utc::now();
        let active = feedback::ActiveModel {
            uuid: Set(feedback_id),
            owner_id: Set(owner_row_id),
            title: Set(data.title.clone()),
            description: Set(data.description.clone()),
            category: Set(None),
            priority: Set(None),
            status: Set(FeedbackStatus::Pending.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Self::enqueue_change(db, EVENT_FEEDBACK_CREATED, feedback_id, owner_id).await?;
        Ok(Self::into_item(model, owner_id))
    }

    /// Applies the workflow's classification. Returns `None` for unknown ids.
    pub async fn classify<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &ClassifyFeedback,
    ) -> Result<Option<FeedbackItem>, DbErr> {
        let Some(record) = feedback::Entity::find()
            .filter(feedback::Column::Uuid.eq(id))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let owner_row_id = record.owner_id;
        let mut active: feedback::ActiveModel = record.into();
        active.category = Set(data.category.map(|category| category.to_string()));
        active.priority = Set(data.priority.map(|priority| priority.to_string()));
        active.status = Set(data.status.to_string());
        active.updated_at = Set(Utc::now().into());
        let model = active.update(db).await?;

        let owner_id = ids::user_uuid_by_id(db, owner_row_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Owner not found".to_string()))?;
        Self::enqueue_change(db, EVENT_FEEDBACK_UPDATED, id, owner_id).await?;
        Ok(Some(Self::into_item(model, owner_id)))
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let Some(record) = feedback::Entity::find()
            .filter(feedback::Column::Uuid.eq(id))
            .one(db)
            .await?
        else {
            return Ok(0);
        };

        let owner_id = ids::user_uuid_by_id(db, record.owner_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Owner not found".to_string()))?;
        let result = feedback::Entity::delete_by_id(record.id).exec(db).await?;
        if result.rows_affected > 0 {
            Self::enqueue_change(db, EVENT_FEEDBACK_DELETED, id, owner_id).await?;
        }
        Ok(result.rows_affected)
    }
}
