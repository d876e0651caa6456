//! Storage-engine-agnostic persistence for subscriptions and notifications.
//!
//! The [`Store`](crate::Store) talks to storage only through the
//! [`Repository`] trait, so any engine that can list, insert, delete and
//! filter records satisfies it:
//! - [`MemoryRepository`]: plain in-memory maps
//! - [`FileRepository`]: the in-memory maps plus an append-only journal,
//!   replayed on open
//!
//! Callers serialize access (the store holds the repository behind one lock),
//! so implementations take `&mut self` for mutations and need no interior
//! locking.

mod file;
mod journal;
mod memory;

pub use file::FileRepository;
pub use memory::MemoryRepository;

use crate::error::Result;
use crate::types::{Notification, Subscription, SubscriptionId};

/// Generic repository over the subscription/notification collections.
pub trait Repository: Send {
    /// All subscriptions, in no particular order.
    fn subscriptions(&self) -> Result<Vec<Subscription>>;

    fn subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>>;

    /// Look up a subscription by its (server, topic) identity.
    fn find_subscription(&self, base_url: &str, topic: &str) -> Result<Option<Subscription>>;

    /// Reserve the next unused subscription id.
    fn next_subscription_id(&mut self) -> SubscriptionId;

    fn insert_subscription(&mut self, subscription: Subscription) -> Result<()>;

    /// Replace an existing subscription row.
    fn update_subscription(&mut self, subscription: Subscription) -> Result<()>;

    /// Delete a subscription and all of its notifications.
    ///
    /// Returns false if it did not exist.
    fn delete_subscription(&mut self, id: SubscriptionId) -> Result<bool>;

    /// Notifications owned by a subscription, in no particular order.
    fn notifications(&self, id: SubscriptionId) -> Result<Vec<Notification>>;

    fn contains_notification(&self, id: SubscriptionId, message_id: &str) -> Result<bool>;

    /// Insert unless a notification with the same message id exists.
    ///
    /// Returns whether it was inserted.
    fn insert_notification(&mut self, notification: Notification) -> Result<bool>;

    /// Delete the given message ids. Returns how many existed.
    fn delete_notifications(&mut self, id: SubscriptionId, message_ids: &[String])
        -> Result<usize>;

    /// Delete every notification of a subscription. Returns how many existed.
    fn clear_notifications(&mut self, id: SubscriptionId) -> Result<usize>;

    /// Notifications across all subscriptions matching a predicate.
    fn query_notifications(
        &self,
        predicate: &dyn Fn(&Notification) -> bool,
    ) -> Result<Vec<Notification>>;

    /// Flush pending writes to durable storage.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reclaim space taken by superseded writes.
    fn compact(&mut self) -> Result<()> {
        Ok(())
    }
}
