use std::{sync::Arc, time::Duration};

use chrono::Utc;
use db::{
    DBService,
    events::{
        EVENT_FEEDBACK_CREATED, EVENT_FEEDBACK_DELETED, EVENT_FEEDBACK_UPDATED,
        FeedbackEventPayload,
    },
    models::{event_outbox::EventOutbox, feedback::Feedback},
};
use feedback_protocol::ChangeEvent;
use futures::stream::BoxStream;
use utils::change_hub::ChangeHub;
use uuid::Uuid;

use super::config::OutboxConfig;

#[path = "events/types.rs"]
pub mod types;

pub use types::EventError;

#[derive(Clone, Copy)]
enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Moves committed outbox rows onto the change hub. Delivery is at-least-once
/// per running process: a row is marked published only after it was handed to
/// the hub, and rows that keep failing stop being retried after
/// `max_attempts`.
#[derive(Clone)]
pub struct EventService {
    hub: Arc<ChangeHub>,
    db: DBService,
    settings: OutboxConfig,
}

impl EventService {
    pub fn new(db: DBService, hub: Arc<ChangeHub>, settings: OutboxConfig) -> Self {
        let service = Self { hub, db, settings };
        service.spawn_outbox_worker();
        service
    }

    fn spawn_outbox_worker(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            service.run_outbox_loop().await;
        });
    }

    async fn run_outbox_loop(&self) {
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        tracing::debug!(?interval, batch_limit = self.settings.batch_limit, "outbox worker started");
        loop {
            if let Err(err) = self.flush_pending().await {
                tracing::error!(error = %err, "event outbox flush failed");
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Publishes one batch of unpublished outbox rows. Returns how many were
    /// delivered to the hub.
    pub async fn flush_pending(&self) -> Result<usize, EventError> {
        let entries = EventOutbox::fetch_unpublished(
            &self.db.pool,
            self.settings.batch_limit,
            self.settings.max_attempts,
        )
        .await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut published = 0;
        for entry in entries {
            match self.dispatch_entry(&entry).await {
                Ok(()) => {
                    EventOutbox::mark_published(&self.db.pool, entry.id).await?;
                    published += 1;
                }
                Err(err) => {
                    let err_msg = err.to_string();
                    tracing::warn!(event_id = entry.uuid.to_string(), error = %err_msg, "event dispatch failed");
                    EventOutbox::mark_failed(&self.db.pool, entry.id, &err_msg).await?;
                }
            }
        }

        Ok(published)
    }

    async fn dispatch_entry(
        &self,
        entry: &db::entities::event_outbox::Model,
    ) -> Result<(), EventError> {
        let kind = match entry.event_type.as_str() {
            EVENT_FEEDBACK_CREATED => ChangeKind::Insert,
            EVENT_FEEDBACK_UPDATED => ChangeKind::Update,
            EVENT_FEEDBACK_DELETED => ChangeKind::Delete,
            _ => {
                tracing::debug!(event_type = entry.event_type.as_str(), "unknown event type");
                return Ok(());
            }
        };

        let payload: FeedbackEventPayload = serde_json::from_value(entry.payload.clone())?;
        self.emit_feedback_change(payload, kind).await
    }

    async fn emit_feedback_change(
        &self,
        payload: FeedbackEventPayload,
        kind: ChangeKind,
    ) -> Result<(), EventError> {
        if matches!(kind, ChangeKind::Delete) {
            self.hub
                .publish(payload.owner_id, ChangeEvent::delete(payload.feedback_id));
            return Ok(());
        }

        // The row may be gone by the time the insert/update is flushed; its
        // delete event follows in the outbox.
        let Some(item) = Feedback::find_by_id(&self.db.pool, payload.feedback_id).await? else {
            return Ok(());
        };

        let event = match kind {
            ChangeKind::Insert => ChangeEvent::insert(item),
            _ => ChangeEvent::update(item),
        };
        self.hub.publish(payload.owner_id, event);
        Ok(())
    }

    /// Live changes for `owner_id`, starting now.
    pub fn subscribe(&self, owner_id: Uuid) -> BoxStream<'static, ChangeEvent> {
        self.hub.subscribe(owner_id)
    }

    /// Deletes published outbox rows older than the configured retention.
    pub async fn prune_published(&self) -> Result<u64, EventError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.settings.retention_secs);
        Ok(EventOutbox::prune_published_before(&self.db.pool, cutoff).await?)
    }

    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }
}

#[cfg(test)]
mod tests {
    use db::models::user::User;
    use feedback_protocol::{
        ClassifyFeedback, CreateFeedback, FeedbackCategory, FeedbackPriority, FeedbackStatus,
    };
    use futures::StreamExt;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;

    async fn setup() -> EventService {
        let pool = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&pool, None).await.unwrap();
        EventService {
            hub: Arc::new(ChangeHub::new()),
            db: DBService { pool },
            settings: OutboxConfig::default(),
        }
    }

    async fn seed_user(service: &EventService, email: &str) -> Uuid {
        User::create(&service.db.pool, email, "hash", Uuid::new_v4())
            .await
            .unwrap()
            .id
    }

    fn submission() -> CreateFeedback {
        CreateFeedback {
            title: "Dark mode".to_string(),
            description: "Please add a dark theme to the dashboard".to_string(),
        }
    }

    #[tokio::test]
    async fn flush_pending_publishes_outbox_in_order_to_owner() {
        let service = setup().await;
        let owner = seed_user(&service, "owner@example.com").await;
        let other = seed_user(&service, "other@example.com").await;
        let mut stream = service.subscribe(owner);

        let item = Feedback::create(&service.db.pool, owner, &submission(), Uuid::new_v4())
            .await
            .unwrap();
        Feedback::create(&service.db.pool, other, &submission(), Uuid::new_v4())
            .await
            .unwrap();
        Feedback::classify(
            &service.db.pool,
            item.id,
            &ClassifyFeedback {
                category: Some(FeedbackCategory::Feature),
                priority: Some(FeedbackPriority::Low),
                status: FeedbackStatus::Processed,
            },
        )
        .await
        .unwrap();
        Feedback::delete(&service.db.pool, item.id).await.unwrap();

        assert_eq!(service.flush_pending().await.unwrap(), 4);

        // Insert and update were flushed after the delete, so the row is gone
        // and only the delete reaches the subscriber.
        let event = stream.next().await.unwrap();
        assert_eq!(event, ChangeEvent::delete(item.id));

        let unpublished = EventOutbox::fetch_unpublished(&service.db.pool, 10, 5)
            .await
            .unwrap();
        assert!(unpublished.is_empty());
    }

    #[tokio::test]
    async fn insert_then_update_are_delivered_as_separate_events() {
        let service = setup().await;
        let owner = seed_user(&service, "owner@example.com").await;
        let mut stream = service.subscribe(owner);

        let item = Feedback::create(&service.db.pool, owner, &submission(), Uuid::new_v4())
            .await
            .unwrap();
        service.flush_pending().await.unwrap();

        match stream.next().await.unwrap() {
            ChangeEvent::Insert { record } => assert_eq!(record.id, item.id),
            other => panic!("expected insert, got {other:?}"),
        }

        Feedback::classify(
            &service.db.pool,
            item.id,
            &ClassifyFeedback {
                category: Some(FeedbackCategory::Urgent),
                priority: Some(FeedbackPriority::High),
                status: FeedbackStatus::Reviewed,
            },
        )
        .await
        .unwrap();
        service.flush_pending().await.unwrap();

        match stream.next().await.unwrap() {
            ChangeEvent::Update { record } => {
                assert_eq!(record.status, FeedbackStatus::Reviewed);
                assert_eq!(record.category, Some(FeedbackCategory::Urgent));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_marked_failed() {
        let service = setup().await;

        EventOutbox::enqueue(
            &service.db.pool,
            EVENT_FEEDBACK_CREATED,
            "feedback",
            Uuid::new_v4(),
            serde_json::Value::Null,
        )
        .await
        .unwrap();

        assert_eq!(service.flush_pending().await.unwrap(), 0);

        let unpublished = EventOutbox::fetch_unpublished(&service.db.pool, 10, 5)
            .await
            .unwrap();
        assert_eq!(unpublished.len(), 1);
        assert_eq!(unpublished[0].attempts, 1);
        assert!(unpublished[0].last_error.is_some());
    }

    #[tokio::test]
    async fn prune_keeps_recent_published_rows() {
        let service = setup().await;
        let owner = seed_user(&service, "owner@example.com").await;
        Feedback::create(&service.db.pool, owner, &submission(), Uuid::new_v4())
            .await
            .unwrap();
        service.flush_pending().await.unwrap();

        assert_eq!(service.prune_published().await.unwrap(), 0);
    }
}
