use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoticeVariant {
    #[default]
    Default,
    Destructive,
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.variant == NoticeVariant::Destructive
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Collects notifications until a front-end drains them.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Mutex<Vec<Notification>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn last(&self) -> Option<Notification> {
        self.pending
            .lock()
            .map(|pending| pending.last().cloned())
            .unwrap_or_default()
    }
}

impl Notifier for NotificationQueue {
    fn notify(&self, notification: Notification) {
        tracing::debug!(
            title = %notification.title,
            destructive = notification.is_destructive(),
            "notification"
        );
        match self.pending.lock() {
            Ok(mut pending) => pending.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_in_order() {
        let queue = NotificationQueue::new();
        queue.notify(Notification::info("a", "first"));
        queue.notify(Notification::destructive("b", "second"));

        assert_eq!(queue.last().map(|n| n.title), Some("b".to_string()));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(!drained[0].is_destructive());
        assert!(drained[1].is_destructive());
        assert!(queue.drain().is_empty());
    }
}
