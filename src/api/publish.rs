//! Outbound message construction.

use crate::error::{NtfyError, Result};
use crate::types::Priority;
use rand::seq::SliceRandom;
use rand::Rng;

const TEST_TITLE: &str = "Test: You can set a title if you like";

const TEST_TAGS: &[&str] = &[
    "warning",
    "skull",
    "success",
    "triangular_flag_on_post",
    "de",
    "us",
    "dog",
    "cat",
    "rotating_light",
    "bike",
    "backup",
    "rsync",
    "this-s-a-tag",
    "ios",
];

/// A message to publish to a topic.
///
/// Priority and tags are validated here, before anything is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishRequest {
    pub message: String,
    pub title: Option<String>,
    pub priority: Priority,
    /// Unordered set; kept in first-seen order for the header.
    pub tags: Vec<String>,
}

impl PublishRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            title: None,
            priority: Priority::DEFAULT,
            tags: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set priority from a raw value, rejecting anything outside 1-5.
    pub fn with_priority_value(self, value: u8) -> Result<Self> {
        Ok(self.with_priority(Priority::new(value)?))
    }

    /// Add tags. Duplicates are dropped; tags are comma-joined on the wire,
    /// so a tag may not contain a comma.
    pub fn with_tags<I, T>(mut self, tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for tag in tags {
            let tag = tag.into().trim().to_string();
            if tag.is_empty() || tag.contains(',') {
                return Err(NtfyError::Validation(format!("invalid tag: {:?}", tag)));
            }
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        Ok(self)
    }

    /// A sample message with a random priority and up to three random tags,
    /// for checking that a subscription receives what is published.
    pub fn test_notification() -> Self {
        Self::test_notification_with(&mut rand::thread_rng())
    }

    pub fn test_notification_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let priority = Priority::new(rng.gen_range(1..=5)).unwrap_or(Priority::DEFAULT);
        let count = rng.gen_range(0..4);
        let tags = TEST_TAGS
            .choose_multiple(rng, count)
            .map(|t| t.to_string())
            .collect();
        Self {
            message: format!(
                "This is a test notification from the ntfy iOS app. It has a priority of {}. \
                 If you send another one, it may look different.",
                priority.value()
            ),
            title: Some(TEST_TITLE.to_string()),
            priority,
            tags,
        }
    }

    /// Value of the `Tags` header, None when there are no tags.
    pub fn tags_header(&self) -> Option<String> {
        if self.tags.is_empty() {
            None
        } else {
            Some(self.tags.join(","))
        }
    }
}
