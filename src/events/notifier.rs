//! Fan-out of store change events to observers.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{ChangeEvent, ChangeScope, ObserverFilter, ObserverHandle, ObserverId};

/// Internal observer state.
struct Observer {
    filter: ObserverFilter,
    sender: Sender<ChangeEvent>,
}

impl Observer {
    /// Offer an event. Returns false once the receiver is gone.
    ///
    /// A full channel already holds an undelivered event, which covers this
    /// one too.
    fn offer(&self, event: ChangeEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages observers and broadcasts change events.
pub struct ChangeNotifier {
    /// Active observers by ID.
    observers: RwLock<HashMap<ObserverId, Observer>>,
    /// Counter for generating observer IDs.
    next_id: AtomicU64,
    /// Bumped once per broadcast.
    generation: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            generation: AtomicU64::new(0),
        }
    }

    /// Register an observer.
    pub fn observe(&self, filter: ObserverFilter) -> ObserverHandle {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(1);

        self.observers
            .write()
            .insert(id, Observer { filter, sender });

        ObserverHandle { id, receiver }
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn unobserve(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().remove(&id) {
            // Best effort; a pending Changed may occupy the slot
            let _ = observer.sender.try_send(ChangeEvent::Closed);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Tell every observer whose filter matches any of `scopes`.
    pub fn notify(&self, scopes: &[ChangeScope]) {
        if scopes.is_empty() {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ChangeEvent::Changed { generation };

        let mut to_remove = Vec::new();
        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                let wanted = scopes.iter().any(|s| observer.filter.matches(s));
                if wanted && !observer.offer(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        // Remove observers whose handles were dropped
        if !to_remove.is_empty() {
            let mut observers = self.observers.write();
            for id in to_remove {
                observers.remove(&id);
            }
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
