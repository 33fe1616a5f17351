use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_FEEDBACK_CREATED: &str = "feedback.created";
pub const EVENT_FEEDBACK_UPDATED: &str = "feedback.updated";
pub const EVENT_FEEDBACK_DELETED: &str = "feedback.deleted";

pub const ENTITY_FEEDBACK: &str = "feedback";

/// Outbox payload for feedback changes. The owner travels with the event so a
/// delete can still be routed after the row is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEventPayload {
    pub feedback_id: Uuid,
    pub owner_id: Uuid,
}
