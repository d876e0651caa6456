//! In-memory repository.

use super::Repository;
use crate::error::{NtfyError, Result};
use crate::types::{Notification, Subscription, SubscriptionId};
use std::collections::{BTreeMap, HashMap};

/// Subscriptions by id, notifications by (subscription, message id).
pub struct MemoryRepository {
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    notifications: HashMap<SubscriptionId, HashMap<String, Notification>>,
    next_id: u64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            subscriptions: BTreeMap::new(),
            notifications: HashMap::new(),
            next_id: 1,
        }
    }

    /// Total notifications across all subscriptions.
    pub fn notification_count(&self) -> usize {
        self.notifications.values().map(HashMap::len).sum()
    }

    /// Notifications currently stored for one subscription.
    pub(crate) fn owned_count(&self, id: SubscriptionId) -> usize {
        self.notifications.get(&id).map_or(0, HashMap::len)
    }

    /// Lowest id `next_subscription_id` may still return.
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Never hand out ids below `next_id`.
    pub(crate) fn reserve_ids(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }

    /// Iterate subscriptions and their notifications (for snapshots).
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Subscription, Vec<&Notification>)> + '_ {
        self.subscriptions.values().map(move |sub| {
            let owned = self
                .notifications
                .get(&sub.id)
                .map(|m| m.values().collect())
                .unwrap_or_default();
            (sub, owned)
        })
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MemoryRepository {
    fn subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.values().cloned().collect())
    }

    fn subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.get(&id).cloned())
    }

    fn find_subscription(&self, base_url: &str, topic: &str) -> Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .values()
            .find(|s| s.is(base_url, topic))
            .cloned())
    }

    fn next_subscription_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert_subscription(&mut self, subscription: Subscription) -> Result<()> {
        if let Some(existing) = self.find_subscription(&subscription.base_url, &subscription.topic)? {
            if existing.id != subscription.id {
                return Err(NtfyError::Duplicate {
                    base_url: subscription.base_url,
                    topic: subscription.topic,
                });
            }
        }
        // Ids seen on replay must never be handed out again.
        self.next_id = self.next_id.max(subscription.id.0 + 1);
        self.notifications.entry(subscription.id).or_default();
        self.subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    fn update_subscription(&mut self, subscription: Subscription) -> Result<()> {
        match self.subscriptions.get_mut(&subscription.id) {
            Some(slot) => {
                *slot = subscription;
                Ok(())
            }
            None => Err(NtfyError::SubscriptionNotFound(subscription.id)),
        }
    }

    fn delete_subscription(&mut self, id: SubscriptionId) -> Result<bool> {
        self.notifications.remove(&id);
        Ok(self.subscriptions.remove(&id).is_some())
    }

    fn notifications(&self, id: SubscriptionId) -> Result<Vec<Notification>> {
        if !self.subscriptions.contains_key(&id) {
            return Err(NtfyError::SubscriptionNotFound(id));
        }
        Ok(self
            .notifications
            .get(&id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    fn contains_notification(&self, id: SubscriptionId, message_id: &str) -> Result<bool> {
        Ok(self
            .notifications
            .get(&id)
            .map_or(false, |m| m.contains_key(message_id)))
    }

    fn insert_notification(&mut self, notification: Notification) -> Result<bool> {
        if !self.subscriptions.contains_key(&notification.subscription) {
            return Err(NtfyError::SubscriptionNotFound(notification.subscription));
        }
        let owned = self.notifications.entry(notification.subscription).or_default();
        if owned.contains_key(&notification.id) {
            return Ok(false);
        }
        owned.insert(notification.id.clone(), notification);
        Ok(true)
    }

    fn delete_notifications(
        &mut self,
        id: SubscriptionId,
        message_ids: &[String],
    ) -> Result<usize> {
        let Some(owned) = self.notifications.get_mut(&id) else {
            return Ok(0);
        };
        Ok(message_ids
            .iter()
            .filter(|mid| owned.remove(mid.as_str()).is_some())
            .count())
    }

    fn clear_notifications(&mut self, id: SubscriptionId) -> Result<usize> {
        Ok(self
            .notifications
            .get_mut(&id)
            .map(|m| {
                let count = m.len();
                m.clear();
                count
            })
            .unwrap_or(0))
    }

    fn query_notifications(
        &self,
        predicate: &dyn Fn(&Notification) -> bool,
    ) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .values()
            .flat_map(|m| m.values())
            .filter(|n| predicate(n))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Timestamp};

    fn subscription(repo: &mut MemoryRepository, topic: &str) -> Subscription {
        let sub = Subscription {
            id: repo.next_subscription_id(),
            base_url: "https://ntfy.sh".into(),
            topic: topic.into(),
            display_name: None,
            muted: false,
            last_notification_id: None,
            last_notification_time: None,
            created: Timestamp::now(),
        };
        repo.insert_subscription(sub.clone()).unwrap();
        sub
    }

    fn notification(sub: &Subscription, id: &str, time: i64) -> Notification {
        Notification::from_message(sub.id, Message::new(id, time, "body"))
    }

    #[test]
    fn test_insert_is_guarded_by_message_id() {
        let mut repo = MemoryRepository::new();
        let sub = subscription(&mut repo, "alerts");

        assert!(repo.insert_notification(notification(&sub, "m1", 1)).unwrap());
        assert!(!repo.insert_notification(notification(&sub, "m1", 1)).unwrap());
        assert_eq!(repo.notifications(sub.id).unwrap().len(), 1);
    }

    #[test]
    fn test_same_message_id_in_two_subscriptions() {
        let mut repo = MemoryRepository::new();
        let a = subscription(&mut repo, "a");
        let b = subscription(&mut repo, "b");

        assert!(repo.insert_notification(notification(&a, "m1", 1)).unwrap());
        assert!(repo.insert_notification(notification(&b, "m1", 1)).unwrap());
        assert_eq!(repo.notification_count(), 2);
    }

    #[test]
    fn test_delete_subscription_cascades() {
        let mut repo = MemoryRepository::new();
        let a = subscription(&mut repo, "a");
        let b = subscription(&mut repo, "b");
        repo.insert_notification(notification(&a, "m1", 1)).unwrap();
        repo.insert_notification(notification(&b, "m2", 1)).unwrap();

        assert!(repo.delete_subscription(a.id).unwrap());
        assert!(!repo.delete_subscription(a.id).unwrap());
        assert!(repo.notifications(a.id).is_err());
        assert_eq!(repo.notifications(b.id).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let mut repo = MemoryRepository::new();
        subscription(&mut repo, "alerts");
        let again = Subscription {
            id: repo.next_subscription_id(),
            base_url: "https://ntfy.sh".into(),
            topic: "alerts".into(),
            display_name: None,
            muted: false,
            last_notification_id: None,
            last_notification_time: None,
            created: Timestamp::now(),
        };
        assert!(matches!(
            repo.insert_subscription(again),
            Err(NtfyError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_insert_into_missing_subscription() {
        let mut repo = MemoryRepository::new();
        let n = Notification::from_message(SubscriptionId(42), Message::new("m1", 1, "x"));
        assert!(matches!(
            repo.insert_notification(n),
            Err(NtfyError::SubscriptionNotFound(_))
        ));
    }

    #[test]
    fn test_query_by_predicate() {
        let mut repo = MemoryRepository::new();
        let sub = subscription(&mut repo, "alerts");
        for (id, time) in [("m1", 10), ("m2", 20), ("m3", 30)] {
            repo.insert_notification(notification(&sub, id, time)).unwrap();
        }

        let recent = repo.query_notifications(&|n| n.time >= Timestamp(20)).unwrap();
        assert_eq!(recent.len(), 2);

        assert_eq!(repo.delete_notifications(sub.id, &["m1".into(), "zz".into()]).unwrap(), 1);
        assert_eq!(repo.clear_notifications(sub.id).unwrap(), 2);
    }
}
