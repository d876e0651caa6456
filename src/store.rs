//! The subscription store: canonical owner of subscriptions and their
//! notifications.

use crate::error::{NtfyError, Result};
use crate::events::{ChangeNotifier, ChangeScope, ObserverFilter, ObserverHandle, ObserverId};
use crate::repository::{FileRepository, MemoryRepository, Repository};
use crate::types::{
    normalize_base_url, validate_topic, Message, Notification, Since, Subscription,
    SubscriptionId, Timestamp,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory for the on-disk store (None = in-memory only).
    pub path: Option<PathBuf>,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Sync the journal every N writes.
    pub sync_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
            sync_interval: 100,
        }
    }
}

/// Result of merging one fetched batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Messages that were new.
    pub inserted: usize,
    /// Messages already present (re-fetched).
    pub skipped: usize,
    /// Cursor after the merge.
    pub cursor: Option<String>,
}

/// The subscription store.
///
/// All reads and writes go through one lock, so the store is the single
/// serialized owner of the collections no matter which thread calls it.
/// Observers are informed after the lock is released.
pub struct Store {
    repo: Mutex<Box<dyn Repository>>,
    notifier: ChangeNotifier,
}

impl Store {
    /// Open a store as configured.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let repo: Box<dyn Repository> = match &config.path {
            None => Box::new(MemoryRepository::new()),
            Some(path) if config.create_if_missing => {
                Box::new(FileRepository::open_or_create(path, config.sync_interval)?)
            }
            Some(path) if path.join("MANIFEST").exists() => {
                Box::new(FileRepository::open(path, config.sync_interval)?)
            }
            Some(_) => return Err(NtfyError::NotInitialized),
        };
        Ok(Self::with_repository(repo))
    }

    /// A store that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Self::with_repository(Box::new(MemoryRepository::new()))
    }

    /// A store over any repository implementation.
    pub fn with_repository(repo: Box<dyn Repository>) -> Self {
        Self {
            repo: Mutex::new(repo),
            notifier: ChangeNotifier::new(),
        }
    }

    // --- Subscriptions ---

    /// Subscribe to a topic on a server.
    ///
    /// Fails with `Duplicate` if the (server, topic) pair already exists.
    pub fn add_subscription(&self, base_url: &str, topic: &str) -> Result<Subscription> {
        let base_url = normalize_base_url(base_url)?;
        validate_topic(topic)?;

        let subscription = {
            let mut repo = self.repo.lock();
            if repo.find_subscription(&base_url, topic)?.is_some() {
                return Err(NtfyError::Duplicate {
                    base_url,
                    topic: topic.to_string(),
                });
            }
            let subscription = Subscription {
                id: repo.next_subscription_id(),
                base_url,
                topic: topic.to_string(),
                display_name: None,
                muted: false,
                last_notification_id: None,
                last_notification_time: None,
                created: Timestamp::now(),
            };
            repo.insert_subscription(subscription.clone())?;
            subscription
        };

        debug!(subscription = %subscription.id, url = %subscription.url(), "Subscribed");
        self.notifier.notify(&[ChangeScope::SubscriptionList]);
        Ok(subscription)
    }

    /// Unsubscribe, deleting all of the subscription's notifications.
    ///
    /// Removing an unknown subscription is a no-op returning false.
    pub fn remove_subscription(&self, id: SubscriptionId) -> Result<bool> {
        let removed = self.repo.lock().delete_subscription(id)?;
        if removed {
            debug!(subscription = %id, "Unsubscribed");
            self.notifier.notify(&[
                ChangeScope::SubscriptionList,
                ChangeScope::Notifications(id),
            ]);
        }
        Ok(removed)
    }

    pub fn subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.repo.lock().subscription(id)
    }

    pub fn find_subscription(&self, base_url: &str, topic: &str) -> Result<Option<Subscription>> {
        let base_url = normalize_base_url(base_url)?;
        self.repo.lock().find_subscription(&base_url, topic)
    }

    /// Subscriptions sorted by topic name ascending.
    pub fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = self.repo.lock().subscriptions()?;
        subscriptions.sort_by(|a, b| {
            a.topic
                .cmp(&b.topic)
                .then_with(|| a.base_url.cmp(&b.base_url))
        });
        Ok(subscriptions)
    }

    /// Mute or unmute. Muting never stops synchronization.
    pub fn set_muted(&self, id: SubscriptionId, muted: bool) -> Result<Subscription> {
        self.update_subscription(id, |s| s.muted = muted)
    }

    /// Override the name shown for a subscription (None restores the topic).
    pub fn set_display_name(
        &self,
        id: SubscriptionId,
        display_name: Option<String>,
    ) -> Result<Subscription> {
        let display_name = display_name.filter(|n| !n.trim().is_empty());
        self.update_subscription(id, |s| s.display_name = display_name)
    }

    /// Current polling cursor of a subscription.
    pub fn since(&self, id: SubscriptionId) -> Result<Since> {
        self.repo
            .lock()
            .subscription(id)?
            .map(|s| s.since())
            .ok_or(NtfyError::SubscriptionNotFound(id))
    }

    fn update_subscription<F>(&self, id: SubscriptionId, change: F) -> Result<Subscription>
    where
        F: FnOnce(&mut Subscription),
    {
        let updated = {
            let mut repo = self.repo.lock();
            let mut subscription = repo
                .subscription(id)?
                .ok_or(NtfyError::SubscriptionNotFound(id))?;
            change(&mut subscription);
            repo.update_subscription(subscription.clone())?;
            subscription
        };
        self.notifier.notify(&[ChangeScope::Subscription(id)]);
        Ok(updated)
    }

    // --- Notifications ---

    /// Store a message unless one with the same id exists.
    ///
    /// Returns whether it was inserted.
    pub fn insert_notification(&self, id: SubscriptionId, message: Message) -> Result<bool> {
        let inserted = self
            .repo
            .lock()
            .insert_notification(Notification::from_message(id, message))?;
        if inserted {
            self.notifier.notify(&[ChangeScope::Notifications(id)]);
        }
        Ok(inserted)
    }

    /// Whether a message id is already stored for a subscription.
    pub fn has_notification(&self, id: SubscriptionId, message_id: &str) -> Result<bool> {
        self.repo.lock().contains_notification(id, message_id)
    }

    /// Notifications of a subscription, newest first.
    pub fn list_notifications(&self, id: SubscriptionId) -> Result<Vec<Notification>> {
        let mut notifications = self.repo.lock().notifications(id)?;
        notifications.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| b.id.cmp(&a.id)));
        Ok(notifications)
    }

    /// Notifications across all subscriptions matching a predicate, newest first.
    pub fn query_notifications<F>(&self, predicate: F) -> Result<Vec<Notification>>
    where
        F: Fn(&Notification) -> bool,
    {
        let mut notifications = self.repo.lock().query_notifications(&predicate)?;
        notifications.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| b.id.cmp(&a.id)));
        Ok(notifications)
    }

    /// Delete a selection of notifications. Returns how many existed.
    pub fn delete_notifications(&self, notifications: &[Notification]) -> Result<usize> {
        let mut by_subscription: BTreeMap<SubscriptionId, Vec<String>> = BTreeMap::new();
        for n in notifications {
            by_subscription
                .entry(n.subscription)
                .or_default()
                .push(n.id.clone());
        }

        let mut deleted = 0;
        let mut scopes = Vec::new();
        {
            let mut repo = self.repo.lock();
            for (id, message_ids) in &by_subscription {
                let count = repo.delete_notifications(*id, message_ids)?;
                if count > 0 {
                    deleted += count;
                    scopes.push(ChangeScope::Notifications(*id));
                }
            }
        }
        self.notifier.notify(&scopes);
        Ok(deleted)
    }

    /// Clear all notifications of a subscription. Returns how many existed.
    pub fn delete_all_notifications(&self, id: SubscriptionId) -> Result<usize> {
        let cleared = {
            let mut repo = self.repo.lock();
            if repo.subscription(id)?.is_none() {
                return Err(NtfyError::SubscriptionNotFound(id));
            }
            repo.clear_notifications(id)?
        };
        if cleared > 0 {
            self.notifier.notify(&[ChangeScope::Notifications(id)]);
        }
        Ok(cleared)
    }

    // --- Merge ---

    /// Merge a fetched batch into a subscription, in server order.
    ///
    /// Messages already present are skipped. Once every insert succeeded the
    /// cursor moves to the last message of the batch, unless that message is
    /// older than the current cursor (a late, overlapping fetch).
    pub fn merge(&self, id: SubscriptionId, messages: Vec<Message>) -> Result<MergeReport> {
        let (report, scopes) = {
            let mut repo = self.repo.lock();
            let mut subscription = repo
                .subscription(id)?
                .ok_or(NtfyError::SubscriptionNotFound(id))?;

            let last = messages.last().map(|m| (m.id.clone(), Timestamp(m.time)));
            let mut report = MergeReport::default();
            for message in messages {
                if repo.insert_notification(Notification::from_message(id, message))? {
                    report.inserted += 1;
                } else {
                    report.skipped += 1;
                }
            }

            let mut scopes = Vec::new();
            if report.inserted > 0 {
                scopes.push(ChangeScope::Notifications(id));
            }

            if let Some((last_id, last_time)) = last {
                let forward = subscription
                    .last_notification_time
                    .map_or(true, |current| last_time >= current);
                let moved = subscription.last_notification_id.as_deref() != Some(last_id.as_str());
                if forward && moved {
                    subscription.last_notification_id = Some(last_id);
                    subscription.last_notification_time = Some(last_time);
                    repo.update_subscription(subscription.clone())?;
                    scopes.push(ChangeScope::Subscription(id));
                }
            }
            report.cursor = subscription.last_notification_id;
            (report, scopes)
        };

        if report.inserted > 0 {
            info!(
                subscription = %id,
                inserted = report.inserted,
                skipped = report.skipped,
                "Merged new notifications"
            );
        }
        self.notifier.notify(&scopes);
        Ok(report)
    }

    // --- Observers ---

    /// Register for change notifications.
    pub fn observe(&self, filter: ObserverFilter) -> ObserverHandle {
        self.notifier.observe(filter)
    }

    /// Cancel an observer registration.
    pub fn unobserve(&self, id: ObserverId) {
        self.notifier.unobserve(id)
    }

    // --- Maintenance ---

    /// Flush pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.repo.lock().sync()
    }

    /// Compact the underlying storage.
    pub fn compact(&self) -> Result<()> {
        self.repo.lock().compact()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.repo.get_mut().sync();
    }
}
