//! # ntfy sync
//!
//! Client-side subscription and notification synchronization for ntfy
//! servers.
//!
//! ## Core Concepts
//!
//! - **Subscriptions**: A (server, topic) pair with a polling cursor
//! - **Notifications**: Stored messages, unique per subscription by id
//! - **Store**: Single owner of both collections, with change observers
//! - **Sync**: Cursor walks that fetch new messages and merge them
//!
//! ## Example
//!
//! ```ignore
//! use ntfy_sync::{ApiClient, ApiConfig, Store, StoreConfig, Synchronizer, SyncTrigger};
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::open(StoreConfig {
//!     path: Some("./ntfy-store".into()),
//!     ..Default::default()
//! })?);
//! let client = Arc::new(ApiClient::new(ApiConfig::default())?);
//!
//! let sub = store.add_subscription("https://ntfy.sh", "alerts")?;
//! let sync = Synchronizer::new(Arc::clone(&store), client);
//! sync.sync(sub.id, SyncTrigger::Manual)?;
//!
//! for n in store.list_notifications(sub.id)? {
//!     println!("{}: {}", n.time.0, n.message);
//! }
//! ```

pub mod api;
pub mod error;
pub mod events;
pub mod repository;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use api::{ApiClient, ApiConfig, ClientSignature, MessageSource, Publish, PublishRequest};
pub use error::{NtfyError, Result};
pub use events::{ChangeEvent, ChangeScope, ObserverFilter, ObserverHandle, ObserverId};
pub use repository::{FileRepository, MemoryRepository, Repository};
pub use store::{MergeReport, Store, StoreConfig};
pub use sync::{
    FetchJob, FetchKind, FetchResult, SyncConfig, SyncOutcome, SyncPool, SyncReport, SyncTrigger,
    Synchronizer,
};
pub use types::*;
