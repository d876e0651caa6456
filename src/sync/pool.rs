//! Worker pool running fetches off the owner's thread.

use super::job::{FetchJob, FetchKind, FetchResult};
use super::synchronizer::Synchronizer;
use super::{SyncOutcome, SyncTrigger};
use crate::api::MessageSource;
use crate::error::{NtfyError, Result};
use crate::types::SubscriptionId;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sync pool configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Number of fetch worker threads.
    pub workers: usize,

    /// Interval between periodic rounds.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// One merged fetch, as seen by the pool owner.
#[derive(Debug)]
pub struct SyncReport {
    pub subscription: SubscriptionId,
    pub trigger: SyncTrigger,
    pub result: Result<SyncOutcome>,
}

/// Runs fetch jobs on worker threads; the owning thread merges results.
///
/// Fetches for different subscriptions run concurrently. A subscription never
/// has more than one cursor walk in flight.
pub struct SyncPool<S: MessageSource + ?Sized + 'static> {
    synchronizer: Synchronizer<S>,
    jobs: Option<Sender<FetchJob>>,
    results: Receiver<FetchResult>,
    workers: Vec<JoinHandle<()>>,
    in_flight: HashSet<SubscriptionId>,
    outstanding: usize,
    poll_interval: Duration,
    last_round: Option<Instant>,
}

impl<S> SyncPool<S>
where
    S: MessageSource + ?Sized + 'static,
{
    /// Spawn the workers.
    pub fn new(synchronizer: Synchronizer<S>, config: SyncConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(NtfyError::Validation("sync pool needs at least one worker".into()));
        }

        let (job_tx, job_rx) = unbounded::<FetchJob>();
        let (result_tx, result_rx) = unbounded::<FetchResult>();

        let mut workers = Vec::with_capacity(config.workers);
        for i in 0..config.workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let source = Arc::clone(synchronizer.source());
            let handle = thread::Builder::new()
                .name(format!("ntfy-sync-{}", i))
                .spawn(move || {
                    for job in jobs.iter() {
                        let result = run_guarded(job, &*source);
                        if results.send(result).is_err() {
                            break;
                        }
                    }
                })?;
            workers.push(handle);
        }

        info!(workers = config.workers, "Started sync pool");

        Ok(Self {
            synchronizer,
            jobs: Some(job_tx),
            results: result_rx,
            workers,
            in_flight: HashSet::new(),
            outstanding: 0,
            poll_interval: config.poll_interval,
            last_round: None,
        })
    }

    pub fn synchronizer(&self) -> &Synchronizer<S> {
        &self.synchronizer
    }

    fn dispatch(&mut self, job: FetchJob) -> Result<()> {
        let jobs = self.jobs.as_ref().ok_or(NtfyError::NotInitialized)?;
        jobs.send(job)
            .map_err(|_| NtfyError::Network("sync workers stopped".into()))?;
        self.outstanding += 1;
        Ok(())
    }

    /// Queue a cursor walk. Returns false if one is already in flight for
    /// this subscription.
    pub fn submit(&mut self, id: SubscriptionId, trigger: SyncTrigger) -> Result<bool> {
        if self.in_flight.contains(&id) {
            debug!(subscription = %id, trigger = %trigger, "Sync already in flight");
            return Ok(false);
        }
        let job = self.synchronizer.plan(id, trigger)?;
        self.dispatch(job)?;
        self.in_flight.insert(id);
        Ok(true)
    }

    /// Queue a single-message fetch. Returns false if the message is already
    /// stored. These bypass the in-flight guard since they never move the
    /// cursor.
    pub fn submit_message(&mut self, id: SubscriptionId, message_id: &str) -> Result<bool> {
        if self.synchronizer.store().has_notification(id, message_id)? {
            return Ok(false);
        }
        let job = self.synchronizer.plan_message(id, message_id)?;
        self.dispatch(job)?;
        Ok(true)
    }

    /// Queue a cursor walk for every subscription. Returns how many were
    /// queued.
    pub fn submit_all(&mut self, trigger: SyncTrigger) -> Result<usize> {
        let subscriptions = self.synchronizer.store().list_subscriptions()?;
        self.submit_each(subscriptions.into_iter().map(|s| s.id), trigger)
    }

    /// Subscriptions removed since they were listed are skipped.
    fn submit_each<I>(&mut self, ids: I, trigger: SyncTrigger) -> Result<usize>
    where
        I: IntoIterator<Item = SubscriptionId>,
    {
        let mut queued = 0;
        for id in ids {
            match self.submit(id, trigger) {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(NtfyError::SubscriptionNotFound(_)) => {
                    debug!(subscription = %id, "Skipping removed subscription");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(queued)
    }

    /// Jobs queued or running whose results haven't been merged yet.
    pub fn pending(&self) -> usize {
        self.outstanding
    }

    fn merge(&mut self, result: FetchResult) -> SyncReport {
        self.outstanding = self.outstanding.saturating_sub(1);
        if matches!(result.kind, FetchKind::Since(_)) {
            self.in_flight.remove(&result.subscription);
        }
        let subscription = result.subscription;
        let trigger = result.trigger;
        let result = self.synchronizer.apply(result);
        if let Err(e) = &result {
            if !e.is_retryable() && !matches!(e, NtfyError::NotFound(_)) {
                error!(subscription = %subscription, error = %e, "Sync merge failed");
            }
        }
        SyncReport {
            subscription,
            trigger,
            result,
        }
    }

    /// Merge every result already available without blocking.
    pub fn merge_ready(&mut self) -> Vec<SyncReport> {
        let mut reports = Vec::new();
        while let Ok(result) = self.results.try_recv() {
            reports.push(self.merge(result));
        }
        reports
    }

    /// Wait up to `timeout` for all outstanding jobs and merge their results.
    pub fn merge_blocking(&mut self, timeout: Duration) -> Vec<SyncReport> {
        let deadline = Instant::now() + timeout;
        let mut reports = Vec::new();
        while self.outstanding > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(result) => reports.push(self.merge(result)),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        reports
    }

    /// Drive the pool from the owner's loop: merge whatever is ready, then
    /// start a periodic round if the poll interval has elapsed.
    ///
    /// A round that fails to start is logged and retried on the next tick;
    /// the merged reports are returned either way.
    pub fn tick(&mut self, now: Instant) -> Vec<SyncReport> {
        let reports = self.merge_ready();
        let due = self
            .last_round
            .map_or(true, |last| now.saturating_duration_since(last) >= self.poll_interval);
        if due {
            match self.submit_all(SyncTrigger::Periodic) {
                Ok(queued) => {
                    self.last_round = Some(now);
                    debug!(queued, "Periodic sync round");
                }
                Err(e) => warn!(error = %e, "Could not start periodic sync round"),
            }
        }
        reports
    }

    /// Stop the workers and wait for them to exit. Unmerged results are
    /// dropped.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the job channel ends each worker's loop
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Sync worker panicked");
            }
        }
    }
}

/// Run a job, turning a panicking source into an error result so the owner
/// still hears back about the subscription.
fn run_guarded<S>(job: FetchJob, source: &S) -> FetchResult
where
    S: MessageSource + ?Sized,
{
    let subscription = job.subscription.id;
    let kind = job.kind.clone();
    let trigger = job.trigger;
    match panic::catch_unwind(AssertUnwindSafe(|| job.run(source))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(subscription = %subscription, reason = %reason, "Message source panicked");
            FetchResult {
                subscription,
                kind,
                trigger,
                messages: Err(NtfyError::WorkerPanic(reason)),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<S> Drop for SyncPool<S>
where
    S: MessageSource + ?Sized + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}
