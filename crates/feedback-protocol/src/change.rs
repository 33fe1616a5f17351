use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::feedback::FeedbackItem;

/// Identity of a removed row. Deletes only carry the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct DeletedRecord {
    pub id: Uuid,
}

/// Row-level change delivered on the owner-scoped stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert { record: FeedbackItem },
    Update { record: FeedbackItem },
    Delete { old_record: DeletedRecord },
}

impl ChangeEvent {
    pub fn insert(record: FeedbackItem) -> Self {
        ChangeEvent::Insert { record }
    }

    pub fn update(record: FeedbackItem) -> Self {
        ChangeEvent::Update { record }
    }

    pub fn delete(id: Uuid) -> Self {
        ChangeEvent::Delete {
            old_record: DeletedRecord { id },
        }
    }

    pub fn row_id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert { record } | ChangeEvent::Update { record } => record.id,
            ChangeEvent::Delete { old_record } => old_record.id,
        }
    }

    /// Owner of the row, when the event carries the full row.
    pub fn owner_id(&self) -> Option<Uuid> {
        match self {
            ChangeEvent::Insert { record } | ChangeEvent::Update { record } => {
                Some(record.owner_id)
            }
            ChangeEvent::Delete { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Insert { .. } => "INSERT",
            ChangeEvent::Update { .. } => "UPDATE",
            ChangeEvent::Delete { .. } => "DELETE",
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::feedback::FeedbackStatus;

    #[test]
    fn delete_event_wire_shape() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(ChangeEvent::delete(id)).unwrap();
        assert_eq!(value["type"], "DELETE");
        assert_eq!(value["old_record"]["id"], id.to_string());
    }

    #[test]
    fn insert_event_decodes_with_record() {
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let raw = serde_json::json!({
            "type": "INSERT",
            "record": {
                "id": id,
                "owner_id": owner,
                "title": "Broken login",
                "description": "The login button does nothing",
                "category": null,
                "priority": null,
                "status": "Pending",
                "created_at": now,
                "updated_at": now,
            }
        });

        let event: ChangeEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.kind(), "INSERT");
        assert_eq!(event.row_id(), id);
        assert_eq!(event.owner_id(), Some(owner));
        match event {
            ChangeEvent::Insert { record } => assert_eq!(record.status, FeedbackStatus::Pending),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
