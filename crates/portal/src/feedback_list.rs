//! Live feedback list: a snapshot of the owner's rows kept current by the
//! owner-scoped change stream.
//!
//! [`ListState`] is the pure reconciliation core. [`LiveFeedbackList`] wires
//! it to a [`Subscription`] and publishes every accepted change through a
//! `watch` channel.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use feedback_protocol::{ChangeEvent, FeedbackItem};
use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{backend::Subscription, client::PortalClient};

/// What an event did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    /// Held until the snapshot arrives.
    Buffered,
    /// Foreign owner, unknown id, or nothing to remove.
    Ignored,
}

impl Applied {
    pub fn changed(&self) -> bool {
        matches!(self, Applied::Inserted | Applied::Replaced | Applied::Removed)
    }
}

#[derive(Debug, Clone)]
pub struct ListState {
    owner_id: Uuid,
    items: Vec<FeedbackItem>,
    /// `Some` until the snapshot is loaded.
    buffered: Option<Vec<ChangeEvent>>,
}

impl ListState {
    /// A list still waiting for its snapshot. Events are buffered.
    pub fn loading(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            items: Vec::new(),
            buffered: Some(Vec::new()),
        }
    }

    pub fn with_snapshot(owner_id: Uuid, snapshot: Vec<FeedbackItem>) -> Self {
        let mut state = Self::loading(owner_id);
        state.load_snapshot(snapshot);
        state
    }

    /// Installs the snapshot, then replays buffered events in arrival order.
    /// Foreign rows and repeated ids in the snapshot are dropped.
    pub fn load_snapshot(&mut self, snapshot: Vec<FeedbackItem>) {
        let owner_id = self.owner_id;
        let mut items: Vec<FeedbackItem> = Vec::with_capacity(snapshot.len());
        for row in snapshot {
            if row.owner_id == owner_id && !items.iter().any(|item| item.id == row.id) {
                items.push(row);
            }
        }
        self.items = items;

        let buffered = self.buffered.take().unwrap_or_default();
        if !buffered.is_empty() {
            tracing::debug!(count = buffered.len(), "replaying buffered change events");
        }
        for event in buffered {
            self.apply(event);
        }
    }

    pub fn apply(&mut self, event: ChangeEvent) -> Applied {
        if let Some(buffered) = self.buffered.as_mut() {
            buffered.push(event);
            return Applied::Buffered;
        }

        match event {
            ChangeEvent::Insert { record } => {
                if record.owner_id != self.owner_id {
                    return Applied::Ignored;
                }
                match self.position(record.id) {
                    Some(idx) => {
                        self.items[idx] = record;
                        Applied::Replaced
                    }
                    None => {
                        self.items.insert(0, record);
                        Applied::Inserted
                    }
                }
            }
            ChangeEvent::Update { record } => {
                if record.owner_id != self.owner_id {
                    return Applied::Ignored;
                }
                match self.position(record.id) {
                    Some(idx) => {
                        self.items[idx] = record;
                        Applied::Replaced
                    }
                    None => Applied::Ignored,
                }
            }
            ChangeEvent::Delete { old_record } => match self.position(old_record.id) {
                Some(idx) => {
                    self.items.remove(idx);
                    Applied::Removed
                }
                None => Applied::Ignored,
            },
        }
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn items(&self) -> &[FeedbackItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.buffered.is_none()
    }
}

struct Shared {
    state: watch::Sender<ListState>,
    released: AtomicBool,
}

impl Shared {
    /// Applies `event` unless the list was torn down. The flag is read under
    /// the channel's write lock, so nothing lands after `release` returns.
    fn apply(&self, event: ChangeEvent) -> Applied {
        let mut outcome = Applied::Ignored;
        self.state.send_if_modified(|state| {
            if self.released.load(Ordering::SeqCst) {
                return false;
            }
            outcome = state.apply(event);
            outcome.changed()
        });
        outcome
    }

    fn load_snapshot(&self, snapshot: Vec<FeedbackItem>) {
        self.state.send_if_modified(|state| {
            if self.released.load(Ordering::SeqCst) {
                return false;
            }
            state.load_snapshot(snapshot);
            true
        });
    }

    fn release(&self) {
        self.state.send_if_modified(|_| {
            self.released.store(true, Ordering::SeqCst);
            false
        });
    }
}

/// A mounted list. Holds at most one change subscription, released exactly
/// once on [`LiveFeedbackList::unmount`], on owner change or on drop.
pub struct LiveFeedbackList {
    owner_id: Uuid,
    shared: Arc<Shared>,
    state: watch::Receiver<ListState>,
    subscription: Option<Subscription>,
    pump: Option<JoinHandle<()>>,
}

impl LiveFeedbackList {
    /// Subscribes first, then loads the snapshot, so changes racing the
    /// initial fetch are buffered instead of lost. A failed fetch is logged
    /// and the list starts empty; a failed subscribe leaves a static list.
    pub async fn mount(client: Arc<PortalClient>, owner_id: Uuid) -> Self {
        let mut list = Self::detached(owner_id);
        list.attach(&client).await;

        let snapshot = match client.list_feedback().await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, %owner_id, "failed to fetch feedback");
                Vec::new()
            }
        };
        list.shared.load_snapshot(snapshot);
        list
    }

    fn detached(owner_id: Uuid) -> Self {
        let (sender, receiver) = watch::channel(ListState::loading(owner_id));
        Self {
            owner_id,
            shared: Arc::new(Shared {
                state: sender,
                released: AtomicBool::new(false),
            }),
            state: receiver,
            subscription: None,
            pump: None,
        }
    }

    async fn attach(&mut self, client: &PortalClient) {
        let mut subscription = match client.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!(error = %err, owner_id = %self.owner_id, "live updates unavailable");
                return;
            }
        };

        let Some(mut events) = subscription.take_events() else {
            return;
        };
        let shared = self.shared.clone();
        let owner_id = self.owner_id;
        self.pump = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if shared.released.load(Ordering::SeqCst) {
                    break;
                }
                let kind = event.kind();
                let applied = shared.apply(event);
                tracing::trace!(%owner_id, kind, ?applied, "change event");
            }
            tracing::debug!(%owner_id, "change stream closed");
        }));
        self.subscription = Some(subscription);
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn is_live(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|subscription| !subscription.is_released())
    }

    /// Current rows, newest first.
    pub fn items(&self) -> Vec<FeedbackItem> {
        self.state.borrow().items().to_vec()
    }

    pub fn snapshot(&self) -> ListState {
        self.state.borrow().clone()
    }

    /// A receiver that wakes on every accepted change. Its `changed()` fails
    /// once the list is unmounted or dropped and its pump has exited.
    pub fn watch(&self) -> watch::Receiver<ListState> {
        self.state.clone()
    }

    /// Waits for the next accepted change. The list holds the sender itself,
    /// so this only returns `false` if the channel was closed underneath it.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Waits until the list satisfies `predicate`. Returns `true` once it
    /// holds; the same closed-channel caveat as [`Self::changed`] applies.
    pub async fn wait_until<F>(&mut self, mut predicate: F) -> bool
    where
        F: FnMut(&ListState) -> bool,
    {
        self.state.wait_for(|state| predicate(state)).await.is_ok()
    }

    fn teardown(&mut self) {
        self.shared.release();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut subscription) = self.subscription.take() {
            if subscription.release() {
                tracing::debug!(owner_id = %self.owner_id, "change subscription released");
            }
        }
    }

    pub fn unmount(mut self) {
        self.teardown();
    }

    /// Tears down the current subscription and mounts a fresh list for
    /// `owner_id`. Same owner is a no-op.
    pub async fn change_owner(self, client: Arc<PortalClient>, owner_id: Uuid) -> Self {
        if owner_id == self.owner_id {
            return self;
        }
        self.unmount();
        Self::mount(client, owner_id).await
    }
}

impl Drop for LiveFeedbackList {
    fn drop(&mut self) {
        self.teardown();
    }
}
