use feedback_protocol::ChangeEvent;
use futures::{StreamExt, stream::BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;

/// A change event tagged with the owner it must be routed to.
#[derive(Debug, Clone)]
pub struct OwnedChange {
    pub owner_id: Uuid,
    pub event: ChangeEvent,
}

/// In-process fan-out of row changes. Publishing never blocks; subscribers that
/// fall behind skip the dropped events.
pub struct ChangeHub {
    sender: broadcast::Sender<OwnedChange>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, owner_id: Uuid, event: ChangeEvent) -> usize {
        tracing::trace!(%owner_id, kind = event.kind(), row_id = %event.row_id(), "publishing change");
        self.sender
            .send(OwnedChange { owner_id, event })
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Live changes for one owner. Only events published after this call are
    /// delivered.
    pub fn subscribe(&self, owner_id: Uuid) -> BoxStream<'static, ChangeEvent> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(move |res| async move {
                match res {
                    Ok(change) if change.owner_id == owner_id => Some(change.event),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(%owner_id, skipped, "change subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use feedback_protocol::{FeedbackItem, FeedbackStatus};

    use super::*;

    fn item(owner_id: Uuid) -> FeedbackItem {
        let now = Utc::now();
        FeedbackItem {
            id: Uuid::new_v4(),
            owner_id,
            title: "Title".to_string(),
            description: "Description text".to_string(),
            category: None,
            priority: None,
            status: FeedbackStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_owner() {
        let hub = ChangeHub::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut stream = hub.subscribe(owner);

        hub.publish(other, ChangeEvent::insert(item(other)));
        let mine = item(owner);
        hub.publish(owner, ChangeEvent::insert(mine.clone()));

        let received = stream.next().await.unwrap();
        assert_eq!(received, ChangeEvent::insert(mine));
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_dropped_events() {
        let hub = ChangeHub::with_capacity(2);
        let owner = Uuid::new_v4();
        let mut stream = hub.subscribe(owner);

        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            hub.publish(owner, ChangeEvent::delete(*id));
        }

        assert_eq!(stream.next().await.unwrap().row_id(), ids[2]);
        assert_eq!(stream.next().await.unwrap().row_id(), ids[3]);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub = ChangeHub::new();
        assert_eq!(hub.publish(Uuid::new_v4(), ChangeEvent::delete(Uuid::new_v4())), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
