//! Cursor walk and merge for one subscription.

use super::job::{FetchJob, FetchKind, FetchResult};
use super::{SyncOutcome, SyncTrigger};
use crate::api::MessageSource;
use crate::error::{NtfyError, Result};
use crate::store::{MergeReport, Store};
use crate::types::SubscriptionId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reconciles subscriptions in a store with a message source.
pub struct Synchronizer<S: ?Sized> {
    store: Arc<Store>,
    source: Arc<S>,
}

impl<S> Synchronizer<S>
where
    S: MessageSource + ?Sized,
{
    pub fn new(store: Arc<Store>, source: Arc<S>) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Plan a cursor walk for a subscription.
    pub fn plan(&self, id: SubscriptionId, trigger: SyncTrigger) -> Result<FetchJob> {
        let subscription = self
            .store
            .subscription(id)?
            .ok_or(NtfyError::SubscriptionNotFound(id))?;
        let since = subscription.since();
        Ok(FetchJob {
            subscription,
            kind: FetchKind::Since(since),
            trigger,
        })
    }

    /// Plan a single-message fetch (push wake-up).
    pub fn plan_message(&self, id: SubscriptionId, message_id: &str) -> Result<FetchJob> {
        let subscription = self
            .store
            .subscription(id)?
            .ok_or(NtfyError::SubscriptionNotFound(id))?;
        Ok(FetchJob {
            subscription,
            kind: FetchKind::Message(message_id.to_string()),
            trigger: SyncTrigger::Push,
        })
    }

    /// Merge a fetch result into the store.
    ///
    /// Results for subscriptions removed in the meantime are discarded,
    /// whether the fetch succeeded or not.
    pub fn apply(&self, result: FetchResult) -> Result<SyncOutcome> {
        let FetchResult {
            subscription: id,
            kind,
            trigger,
            messages,
        } = result;

        if self.store.subscription(id)?.is_none() {
            debug!(subscription = %id, trigger = %trigger, "Discarding result for removed subscription");
            return Ok(SyncOutcome::Discarded);
        }

        let messages = match messages {
            Ok(messages) => messages,
            Err(e) => {
                if trigger.is_background() {
                    warn!(subscription = %id, trigger = %trigger, error = %e, "Sync failed, waiting for next trigger");
                } else {
                    debug!(subscription = %id, trigger = %trigger, error = %e, "Sync failed");
                }
                return Err(e);
            }
        };

        if messages.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }

        let merged = match kind {
            FetchKind::Since(_) => self.store.merge(id, messages),
            FetchKind::Message(_) => self.insert_pushed(id, messages),
        };

        match merged {
            Ok(report) if report.inserted > 0 => Ok(SyncOutcome::Merged(report)),
            Ok(_) => Ok(SyncOutcome::Unchanged),
            // Removed between the check above and the merge
            Err(NtfyError::SubscriptionNotFound(_)) => Ok(SyncOutcome::Discarded),
            Err(e) => Err(e),
        }
    }

    /// Insert pushed messages with the id guard, leaving the cursor alone so
    /// the next poll still covers any gap before them.
    fn insert_pushed(
        &self,
        id: SubscriptionId,
        messages: Vec<crate::types::Message>,
    ) -> Result<MergeReport> {
        let mut report = MergeReport::default();
        for message in messages {
            if self.store.insert_notification(id, message)? {
                report.inserted += 1;
            } else {
                report.skipped += 1;
            }
        }
        report.cursor = self
            .store
            .subscription(id)?
            .and_then(|s| s.last_notification_id);
        Ok(report)
    }

    /// Run a full cursor walk on the calling thread.
    pub fn sync(&self, id: SubscriptionId, trigger: SyncTrigger) -> Result<SyncOutcome> {
        let job = self.plan(id, trigger)?;
        self.apply(job.run(&*self.source))
    }

    /// Fetch and merge one message by id on the calling thread.
    ///
    /// Messages already stored are not fetched again.
    pub fn sync_message(&self, id: SubscriptionId, message_id: &str) -> Result<SyncOutcome> {
        if self.store.has_notification(id, message_id)? {
            return Ok(SyncOutcome::Unchanged);
        }
        let job = self.plan_message(id, message_id)?;
        self.apply(job.run(&*self.source))
    }

    /// Sync every subscription, muted ones included, one after another.
    pub fn sync_all(&self, trigger: SyncTrigger) -> Result<Vec<(SubscriptionId, Result<SyncOutcome>)>> {
        let subscriptions = self.store.list_subscriptions()?;
        Ok(subscriptions
            .into_iter()
            .map(|s| (s.id, self.sync(s.id, trigger)))
            .collect())
    }
}
