//! Fetch jobs: the network half of a sync run.

use super::SyncTrigger;
use crate::api::MessageSource;
use crate::error::Result;
use crate::types::{Message, Since, Subscription, SubscriptionId};

/// What to fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchKind {
    /// Everything after a cursor.
    Since(Since),
    /// One message by id (push path, bypasses the cursor).
    Message(String),
}

/// A fetch planned from the store, ready to run anywhere.
#[derive(Clone, Debug)]
pub struct FetchJob {
    /// Snapshot of the subscription at planning time.
    pub subscription: Subscription,
    pub kind: FetchKind,
    pub trigger: SyncTrigger,
}

impl FetchJob {
    /// Perform the fetch. Never touches the store.
    pub fn run<S>(self, source: &S) -> FetchResult
    where
        S: MessageSource + ?Sized,
    {
        let messages = match &self.kind {
            FetchKind::Since(since) => source.fetch_since(&self.subscription, since),
            FetchKind::Message(message_id) => source
                .fetch_one(&self.subscription, message_id)
                .map(|m| vec![m]),
        };
        FetchResult {
            subscription: self.subscription.id,
            kind: self.kind,
            trigger: self.trigger,
            messages,
        }
    }
}

/// Outcome of a fetch, to be merged by the store's owner.
#[derive(Debug)]
pub struct FetchResult {
    pub subscription: SubscriptionId,
    pub kind: FetchKind,
    pub trigger: SyncTrigger,
    pub messages: Result<Vec<Message>>,
}
