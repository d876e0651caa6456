//! Core types for subscriptions and notifications.

use crate::error::{NtfyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum topic length accepted by ntfy servers.
const MAX_TOPIC_LEN: usize = 64;

/// Unique identifier for a subscription (assigned by the store).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seconds since Unix epoch, the resolution ntfy servers use for `time`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Timestamp(secs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Message priority, 1 (min) through 5 (max).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const LOW: Priority = Priority(2);
    pub const DEFAULT: Priority = Priority(3);
    pub const HIGH: Priority = Priority(4);
    pub const MAX: Priority = Priority(5);

    /// Create a priority, rejecting values outside 1..=5.
    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Ok(Priority(value))
        } else {
            Err(NtfyError::Validation(format!(
                "priority {} out of range 1-5",
                value
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

impl TryFrom<u8> for Priority {
    type Error = NtfyError;

    fn try_from(value: u8) -> Result<Self> {
        Priority::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.0
    }
}

impl fmt::Debug for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Polling cursor: everything the server still has, or messages after an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Since {
    All,
    Id(String),
}

impl Since {
    /// Value of the `since=` query parameter.
    pub fn as_query_value(&self) -> &str {
        match self {
            Since::All => "all",
            Since::Id(id) => id,
        }
    }
}

impl fmt::Display for Since {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query_value())
    }
}

/// A topic on a server the user subscribed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier (assigned by store).
    pub id: SubscriptionId,

    /// Server base URL without trailing slash, e.g. `https://ntfy.sh`.
    pub base_url: String,

    /// Topic name on that server.
    pub topic: String,

    /// Optional user override of the topic name.
    pub display_name: Option<String>,

    /// Muting affects alerting only; muted subscriptions still synchronize.
    pub muted: bool,

    /// Id of the last merged message (None = never polled).
    pub last_notification_id: Option<String>,

    /// Delivery time of the last merged message, keeps the cursor monotonic.
    pub last_notification_time: Option<Timestamp>,

    /// When the subscription was created.
    pub created: Timestamp,
}

impl Subscription {
    /// Topic endpoint, `{base_url}/{topic}`.
    pub fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.topic)
    }

    /// Name shown to the user.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.topic)
    }

    /// Cursor to poll from.
    pub fn since(&self) -> Since {
        match &self.last_notification_id {
            Some(id) => Since::Id(id.clone()),
            None => Since::All,
        }
    }

    /// Whether this subscription is the (server, topic) pair given.
    pub fn is(&self, base_url: &str, topic: &str) -> bool {
        self.base_url == base_url && self.topic == topic
    }
}

/// A message as delivered by the server (one NDJSON line).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    /// Delivery time in seconds since epoch.
    pub time: i64,

    /// Stream event kind; absent or `message` for real messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Body text; absent on open/keepalive events.
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click: Option<String>,
}

impl Message {
    /// Minimal message, mostly useful for tests and fakes.
    pub fn new(id: impl Into<String>, time: i64, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            time,
            event: None,
            topic: None,
            title: None,
            message: message.into(),
            priority: None,
            tags: Vec::new(),
            click: None,
        }
    }

    /// Whether this line carries a message (as opposed to open/keepalive).
    pub fn is_message(&self) -> bool {
        self.event.as_deref().map_or(true, |e| e == "message")
    }
}

/// A stored message, owned by exactly one subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Owning subscription.
    pub subscription: SubscriptionId,

    /// Server-issued message id, unique per subscription.
    pub id: String,

    /// Delivery time.
    pub time: Timestamp,

    pub title: Option<String>,

    pub message: String,

    pub priority: Priority,

    pub tags: BTreeSet<String>,

    pub click: Option<String>,
}

impl Notification {
    /// Build the stored form of a fetched message.
    pub fn from_message(subscription: SubscriptionId, message: Message) -> Self {
        Self {
            subscription,
            id: message.id,
            time: Timestamp(message.time),
            title: message.title,
            message: message.message,
            priority: message.priority.unwrap_or_default(),
            tags: message.tags.into_iter().collect(),
            click: message.click,
        }
    }
}

/// Strip trailing slashes and require an http(s) scheme.
pub fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match host {
        Some(h) if !h.is_empty() => Ok(trimmed.to_string()),
        _ => Err(NtfyError::Validation(format!(
            "invalid server URL: {:?}",
            base_url
        ))),
    }
}

/// Topics are 1-64 characters of `[A-Za-z0-9_-]`.
pub fn validate_topic(topic: &str) -> Result<()> {
    let valid = !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(NtfyError::Validation(format!("invalid topic: {:?}", topic)))
    }
}
