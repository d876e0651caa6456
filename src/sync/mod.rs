//! Subscription synchronization.
//!
//! A sync run reconciles one subscription's cursor with the server:
//! 1. Read the cursor (last merged message id, or "all")
//! 2. Fetch messages since the cursor
//! 3. Merge them into the store, skipping ids already present, and advance
//!    the cursor to the last message returned
//!
//! The run is split so the network part can happen elsewhere:
//! [`Synchronizer::plan`] reads the cursor, [`FetchJob::run`] performs the
//! fetch without touching the store, and [`Synchronizer::apply`] merges the
//! result. [`SyncPool`] runs fetches on worker threads and hands results back
//! to the thread that owns the pool for merging.
//!
//! Failed fetches leave the store and cursor untouched, so any run can simply
//! be repeated on the next trigger.

mod job;
mod pool;
mod synchronizer;

pub use job::{FetchJob, FetchKind, FetchResult};
pub use pool::{SyncConfig, SyncPool, SyncReport};
pub use synchronizer::Synchronizer;

use crate::store::MergeReport;
use std::fmt;

/// What caused a sync run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
    /// User pull-to-refresh; failures go back to the caller.
    Manual,
    /// Timer while the app is active.
    Periodic,
    /// External wake-up naming one message.
    Push,
}

impl SyncTrigger {
    /// Background triggers only log failures and wait for the next round.
    pub fn is_background(self) -> bool {
        !matches!(self, SyncTrigger::Manual)
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::Push => "push",
        };
        f.write_str(name)
    }
}

/// Result of a successful sync run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing new.
    Unchanged,
    /// At least one message was inserted.
    Merged(MergeReport),
    /// The subscription was removed while the fetch was in flight.
    Discarded,
}

impl SyncOutcome {
    /// Number of notifications inserted by this run.
    pub fn inserted(&self) -> usize {
        match self {
            SyncOutcome::Merged(report) => report.inserted,
            _ => 0,
        }
    }
}
