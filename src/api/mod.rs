//! HTTP side of the sync engine: fetching and publishing messages.
//!
//! - [`MessageSource`]: the fetcher seam (`fetch_since`, `fetch_one`)
//! - [`Publish`]: the publisher seam
//! - [`ApiClient`]: both, over blocking HTTP
//!
//! Wire format, one call shape per operation:
//!
//! ```text
//! GET  {server}/{topic}/json?poll=1&since={id|all}   -> NDJSON, one message per line
//! GET  {server}/{topic}/json?poll=1&id={message id}  -> one JSON message
//! POST {server}/{topic}   Title / Priority / Tags headers, raw UTF-8 body
//! ```
//!
//! Fetchers and publishers never touch the store; they are stateless and safe
//! to call concurrently for different subscriptions.

mod client;
mod parse;
mod publish;
mod signature;

pub use client::{ApiClient, ApiConfig};
pub use parse::{parse_message, parse_messages};
pub use publish::PublishRequest;
pub use signature::ClientSignature;

use crate::error::Result;
use crate::types::{Message, Since, Subscription};

/// Source of messages for a subscription.
pub trait MessageSource: Send + Sync {
    /// Messages published after `since`, in server order.
    ///
    /// A single malformed line fails the whole call.
    fn fetch_since(&self, subscription: &Subscription, since: &Since) -> Result<Vec<Message>>;

    /// One message by id. `NotFound` if the server has nothing for it.
    fn fetch_one(&self, subscription: &Subscription, message_id: &str) -> Result<Message>;
}

/// Outbound side: send a message to a topic.
pub trait Publish: Send + Sync {
    fn publish(&self, subscription: &Subscription, request: &PublishRequest) -> Result<()>;
}

/// Poll endpoint for messages after a cursor.
pub fn poll_url(subscription: &Subscription, since: &Since) -> String {
    format!(
        "{}/json?poll=1&since={}",
        subscription.url(),
        urlencoding::encode(since.as_query_value())
    )
}

/// Poll endpoint for a single message.
pub fn message_url(subscription: &Subscription, message_id: &str) -> String {
    format!(
        "{}/json?poll=1&id={}",
        subscription.url(),
        urlencoding::encode(message_id)
    )
}
