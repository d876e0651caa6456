//! Journal-backed repository.

use super::journal::{Journal, JournalEntry};
use super::{MemoryRepository, Repository};
use crate::error::{NtfyError, Result};
use crate::types::{Notification, Subscription, SubscriptionId};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"NTS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Repository that keeps the working set in memory and journals every
/// mutation to `journal.log` inside its directory.
///
/// A mutation reaches memory only after its journal entry was written, so a
/// failed write leaves both sides as they were.
pub struct FileRepository {
    /// Lock file for exclusive access.
    _lock_file: File,

    memory: MemoryRepository,

    journal: Journal,
}

impl FileRepository {
    /// Open an existing store directory or create a new one.
    pub fn open_or_create(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref();
        if path.join("MANIFEST").exists() {
            Self::open(path, sync_interval)
        } else {
            Self::create(path, sync_interval)
        }
    }

    /// Create a new store directory.
    pub fn create(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Self::write_manifest(&path)?;
        Self::open_verified(path, sync_interval)
    }

    /// Open an existing store directory, replaying its journal.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::verify_manifest(&path)?;
        Self::open_verified(path, sync_interval)
    }

    fn open_verified(path: PathBuf, sync_interval: u64) -> Result<Self> {
        let lock_file = Self::acquire_lock(&path)?;
        let (journal, entries) = Journal::open(path.join("journal.log"), sync_interval)?;

        let mut memory = MemoryRepository::new();
        let replayed = entries.len();
        for entry in entries {
            apply(&mut memory, entry)?;
        }
        debug!(path = %path.display(), replayed, "Opened journal");

        Ok(Self {
            _lock_file: lock_file,
            memory,
            journal,
        })
    }

    /// Journal size in bytes.
    pub fn journal_size(&self) -> u64 {
        self.journal.size()
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(NtfyError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(NtfyError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }
        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| NtfyError::Locked)?;
        Ok(lock_file)
    }
}

/// Apply a journal entry to the in-memory state.
fn apply(memory: &mut MemoryRepository, entry: JournalEntry) -> Result<()> {
    match entry {
        JournalEntry::PutSubscription(sub) => {
            if memory.subscription(sub.id)?.is_some() {
                memory.update_subscription(sub)
            } else {
                memory.insert_subscription(sub)
            }
        }
        JournalEntry::RemoveSubscription(id) => memory.delete_subscription(id).map(drop),
        JournalEntry::PutNotification(n) => match memory.insert_notification(n) {
            // Writes for a subscription removed later in the same batch
            Ok(_) | Err(NtfyError::SubscriptionNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        },
        JournalEntry::DeleteNotifications { subscription, ids } => {
            memory.delete_notifications(subscription, &ids).map(drop)
        }
        JournalEntry::ClearNotifications(id) => memory.clear_notifications(id).map(drop),
        JournalEntry::NextSubscriptionId(next_id) => {
            memory.reserve_ids(next_id);
            Ok(())
        }
    }
}

impl Repository for FileRepository {
    fn subscriptions(&self) -> Result<Vec<Subscription>> {
        self.memory.subscriptions()
    }

    fn subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.memory.subscription(id)
    }

    fn find_subscription(&self, base_url: &str, topic: &str) -> Result<Option<Subscription>> {
        self.memory.find_subscription(base_url, topic)
    }

    fn next_subscription_id(&mut self) -> SubscriptionId {
        self.memory.next_subscription_id()
    }

    fn insert_subscription(&mut self, subscription: Subscription) -> Result<()> {
        if let Some(existing) = self
            .memory
            .find_subscription(&subscription.base_url, &subscription.topic)?
        {
            if existing.id != subscription.id {
                return Err(NtfyError::Duplicate {
                    base_url: subscription.base_url,
                    topic: subscription.topic,
                });
            }
        }
        self.journal
            .append(&JournalEntry::PutSubscription(subscription.clone()))?;
        self.memory.insert_subscription(subscription)
    }

    fn update_subscription(&mut self, subscription: Subscription) -> Result<()> {
        if self.memory.subscription(subscription.id)?.is_none() {
            return Err(NtfyError::SubscriptionNotFound(subscription.id));
        }
        self.journal
            .append(&JournalEntry::PutSubscription(subscription.clone()))?;
        self.memory.update_subscription(subscription)
    }

    fn delete_subscription(&mut self, id: SubscriptionId) -> Result<bool> {
        if self.memory.subscription(id)?.is_none() {
            return Ok(false);
        }
        self.journal.append(&JournalEntry::RemoveSubscription(id))?;
        self.memory.delete_subscription(id)
    }

    fn notifications(&self, id: SubscriptionId) -> Result<Vec<Notification>> {
        self.memory.notifications(id)
    }

    fn contains_notification(&self, id: SubscriptionId, message_id: &str) -> Result<bool> {
        self.memory.contains_notification(id, message_id)
    }

    fn insert_notification(&mut self, notification: Notification) -> Result<bool> {
        let id = notification.subscription;
        if self.memory.subscription(id)?.is_none() {
            return Err(NtfyError::SubscriptionNotFound(id));
        }
        if self.memory.contains_notification(id, &notification.id)? {
            return Ok(false);
        }
        self.journal
            .append(&JournalEntry::PutNotification(notification.clone()))?;
        self.memory.insert_notification(notification)
    }

    fn delete_notifications(
        &mut self,
        id: SubscriptionId,
        message_ids: &[String],
    ) -> Result<usize> {
        let mut present = Vec::new();
        for message_id in message_ids {
            if self.memory.contains_notification(id, message_id)? && !present.contains(message_id) {
                present.push(message_id.clone());
            }
        }
        if present.is_empty() {
            return Ok(0);
        }
        self.journal.append(&JournalEntry::DeleteNotifications {
            subscription: id,
            ids: present.clone(),
        })?;
        self.memory.delete_notifications(id, &present)
    }

    fn clear_notifications(&mut self, id: SubscriptionId) -> Result<usize> {
        if self.memory.owned_count(id) == 0 {
            return Ok(0);
        }
        self.journal.append(&JournalEntry::ClearNotifications(id))?;
        self.memory.clear_notifications(id)
    }

    fn query_notifications(
        &self,
        predicate: &dyn Fn(&Notification) -> bool,
    ) -> Result<Vec<Notification>> {
        self.memory.query_notifications(predicate)
    }

    fn sync(&mut self) -> Result<()> {
        self.journal.sync()
    }

    /// Rewrite the journal as one entry per live row, preceded by the id
    /// counter so removed ids stay retired.
    fn compact(&mut self) -> Result<()> {
        let mut entries = vec![JournalEntry::NextSubscriptionId(self.memory.next_id())];
        for (sub, notifications) in self.memory.iter() {
            entries.push(JournalEntry::PutSubscription(sub.clone()));
            entries.extend(
                notifications
                    .into_iter()
                    .map(|n| JournalEntry::PutNotification(n.clone())),
            );
        }
        let before = self.journal.size();
        self.journal.rewrite(entries)?;
        debug!(before, after = self.journal.size(), "Compacted journal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Timestamp};
    use tempfile::TempDir;

    fn new_sub(repo: &mut FileRepository, topic: &str) -> Subscription {
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

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        let (a, b) = {
            let mut repo = FileRepository::create(&path, 1).unwrap();
            let a = new_sub(&mut repo, "a");
            let b = new_sub(&mut repo, "b");
            for i in 0..3 {
                let msg = Message::new(format!("m{}", i), i, "x");
                repo.insert_notification(Notification::from_message(a.id, msg)).unwrap();
            }
            repo.delete_notifications(a.id, &["m0".into()]).unwrap();
            let mut muted = b.clone();
            muted.muted = true;
            repo.update_subscription(muted).unwrap();
            (a, b)
        };

        let mut repo = FileRepository::open(&path, 1).unwrap();
        assert_eq!(repo.notifications(a.id).unwrap().len(), 2);
        assert!(repo.subscription(b.id).unwrap().unwrap().muted);

        // Ids are never reused after reopen
        let c = new_sub(&mut repo, "c");
        assert!(c.id > b.id);
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        let _repo = FileRepository::create(&path, 1).unwrap();
        assert!(matches!(
            FileRepository::open(&path, 1),
            Err(NtfyError::Locked)
        ));
    }

    #[test]
    fn test_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("MANIFEST"), b"XXXX\x01").unwrap();
        assert!(matches!(
            FileRepository::open(dir.path(), 1),
            Err(NtfyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_compact_keeps_live_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        let keep = {
            let mut repo = FileRepository::create(&path, 100).unwrap();
            let drop_me = new_sub(&mut repo, "gone");
            let keep = new_sub(&mut repo, "kept");
            for i in 0..20 {
                let msg = Message::new(format!("m{}", i), i, "payload");
                repo.insert_notification(Notification::from_message(drop_me.id, msg.clone()))
                    .unwrap();
                repo.insert_notification(Notification::from_message(keep.id, msg)).unwrap();
            }
            repo.delete_subscription(drop_me.id).unwrap();

            let before = repo.journal_size();
            repo.compact().unwrap();
            assert!(repo.journal_size() < before);
            keep
        };

        let repo = FileRepository::open(&path, 1).unwrap();
        assert_eq!(repo.subscriptions().unwrap().len(), 1);
        assert_eq!(repo.notifications(keep.id).unwrap().len(), 20);
    }

    #[test]
    fn test_removed_ids_stay_retired_after_compact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        let removed = {
            let mut repo = FileRepository::create(&path, 1).unwrap();
            new_sub(&mut repo, "a");
            let b = new_sub(&mut repo, "b");
            repo.delete_subscription(b.id).unwrap();
            repo.compact().unwrap();
            b.id
        };

        let mut repo = FileRepository::open(&path, 1).unwrap();
        let c = new_sub(&mut repo, "c");
        assert!(c.id > removed);
    }

    #[test]
    fn test_rejected_write_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        let sub = {
            let mut repo = FileRepository::create(&path, 1).unwrap();
            let sub = new_sub(&mut repo, "alerts");
            let huge = Message::new("big", 1, "x".repeat(17 * 1024 * 1024));
            assert!(matches!(
                repo.insert_notification(Notification::from_message(sub.id, huge)),
                Err(NtfyError::Validation(_))
            ));
            assert!(!repo.contains_notification(sub.id, "big").unwrap());

            // A retry of the same id is not mistaken for a duplicate
            let small = Message::new("big", 1, "fits now");
            assert!(repo
                .insert_notification(Notification::from_message(sub.id, small))
                .unwrap());
            sub
        };

        let repo = FileRepository::open(&path, 1).unwrap();
        assert_eq!(repo.notifications(sub.id).unwrap().len(), 1);
    }

    #[test]
    fn test_open_or_create() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        let sub = {
            let mut repo = FileRepository::open_or_create(&path, 1).unwrap();
            new_sub(&mut repo, "alerts")
        };

        let repo = FileRepository::open_or_create(&path, 1).unwrap();
        assert_eq!(repo.subscription(sub.id).unwrap(), Some(sub));
    }
}
