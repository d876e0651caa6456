//! Change notification for store observers.
//!
//! Observers register with a filter and receive [`ChangeEvent::Changed`]
//! whenever a mutation touches what they watch:
//! - The subscription list (add, remove, mute, rename, cursor moves)
//! - One subscription's notifications
//!
//! Delivery is asynchronous and coalescing: each observer has room for one
//! pending event, so a burst of mutations before the observer wakes up yields
//! a single event. Observers re-read the store when woken; the event only
//! carries the store generation it was sent at.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.observe(ObserverFilter::Notifications(sub.id));
//!
//! loop {
//!     match handle.recv() {
//!         Ok(ChangeEvent::Changed { .. }) => redraw(store.list_notifications(sub.id)?),
//!         Ok(ChangeEvent::Closed) | Err(_) => break,
//!     }
//! }
//! ```

mod notifier;
mod types;

pub use notifier::ChangeNotifier;
pub use types::{ChangeEvent, ChangeScope, ObserverFilter, ObserverHandle, ObserverId};
