//! In-process stand-in for an ntfy server.

#![allow(dead_code)]

use ntfy_sync::{Message, MessageSource, NtfyError, Result, Since, Subscription};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Route engine logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("ntfy_sync=debug")
        .try_init();
}

/// Keeps a message log per topic URL and answers polls from it the way a
/// server with an unlimited cache would.
#[derive(Default)]
pub struct FakeServer {
    topics: Mutex<HashMap<String, Vec<Message>>>,
    offline: Mutex<HashSet<String>>,
    polls: Mutex<Vec<(String, String)>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to a topic's log.
    pub fn publish(&self, url: &str, id: &str, time: i64, body: &str) {
        self.topics
            .lock()
            .entry(url.to_string())
            .or_default()
            .push(Message::new(id, time, body));
    }

    /// Make polls for a topic fail with a network error.
    pub fn set_offline(&self, url: &str, offline: bool) {
        let mut set = self.offline.lock();
        if offline {
            set.insert(url.to_string());
        } else {
            set.remove(url);
        }
    }

    /// `(topic url, since)` for every poll so far.
    pub fn polls(&self) -> Vec<(String, String)> {
        self.polls.lock().clone()
    }
}

impl MessageSource for FakeServer {
    fn fetch_since(&self, subscription: &Subscription, since: &Since) -> Result<Vec<Message>> {
        let url = subscription.url();
        self.polls.lock().push((url.clone(), since.to_string()));
        if self.offline.lock().contains(&url) {
            return Err(NtfyError::Network(format!("{} unreachable", url)));
        }

        let topics = self.topics.lock();
        let log = match topics.get(&url) {
            Some(log) => log,
            None => return Ok(Vec::new()),
        };
        let start = match since {
            Since::All => 0,
            Since::Id(id) => log.iter().position(|m| &m.id == id).map_or(0, |i| i + 1),
        };
        Ok(log[start..].to_vec())
    }

    fn fetch_one(&self, subscription: &Subscription, message_id: &str) -> Result<Message> {
        let url = subscription.url();
        if self.offline.lock().contains(&url) {
            return Err(NtfyError::Network(format!("{} unreachable", url)));
        }
        self.topics
            .lock()
            .get(&url)
            .and_then(|log| log.iter().find(|m| m.id == message_id).cloned())
            .ok_or_else(|| NtfyError::NotFound(message_id.to_string()))
    }
}
