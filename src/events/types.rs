//! Observer types for store change notification.

use crate::types::SubscriptionId;
use serde::{Deserialize, Serialize};

/// What an observer wants to hear about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverFilter {
    /// Every mutation.
    All,
    /// The subscription list and subscription rows.
    Subscriptions,
    /// One subscription's notifications and its own row.
    Notifications(SubscriptionId),
}

impl ObserverFilter {
    pub(crate) fn matches(&self, scope: &ChangeScope) -> bool {
        match (self, scope) {
            (ObserverFilter::All, _) => true,
            (ObserverFilter::Subscriptions, ChangeScope::SubscriptionList)
            | (ObserverFilter::Subscriptions, ChangeScope::Subscription(_)) => true,
            (ObserverFilter::Notifications(id), ChangeScope::Subscription(changed))
            | (ObserverFilter::Notifications(id), ChangeScope::Notifications(changed)) => {
                id == changed
            }
            _ => false,
        }
    }
}

/// Part of the store touched by a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeScope {
    /// A subscription was added or removed.
    SubscriptionList,
    /// A subscription row changed (mute, display name, cursor).
    Subscription(SubscriptionId),
    /// Notifications of a subscription were inserted or deleted.
    Notifications(SubscriptionId),
}

/// Events delivered to observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// The watched collection changed; re-read it.
    Changed { generation: u64 },
    /// Observer was removed from the store.
    Closed,
}

/// Unique identifier for an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Handle to an observer registration.
///
/// Dropping the handle cancels the registration; the store prunes it on the
/// next mutation.
pub struct ObserverHandle {
    pub id: ObserverId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ChangeEvent>,
}

impl ObserverHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ChangeEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChangeEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
