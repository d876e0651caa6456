//! Blocking HTTP client for ntfy servers.

use super::parse::{parse_message, parse_messages};
use super::publish::PublishRequest;
use super::signature::ClientSignature;
use super::{message_url, poll_url, MessageSource, Publish};
use crate::error::{NtfyError, Result};
use crate::types::{Message, Since, Subscription};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error};

/// HTTP client configuration.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Sent as User-Agent on every request.
    pub signature: ClientSignature,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            signature: ClientSignature::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Fetcher and publisher over HTTP.
///
/// Holds no per-subscription state; one client can serve every subscription
/// from any number of threads.
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.signature.user_agent())
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send()?;
        Ok(response)
    }
}

/// Turn a non-2xx status into a network error.
fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(NtfyError::Network(format!("{} returned {}", url, status)))
    }
}

impl MessageSource for ApiClient {
    fn fetch_since(&self, subscription: &Subscription, since: &Since) -> Result<Vec<Message>> {
        let url = poll_url(subscription, since);
        debug!(subscription = %subscription.id, url = %url, "Polling");

        let response = check_status(&url, self.get(&url)?)?;
        let body = response.text()?;
        parse_messages(&body)
    }

    fn fetch_one(&self, subscription: &Subscription, message_id: &str) -> Result<Message> {
        let url = message_url(subscription, message_id);
        debug!(subscription = %subscription.id, url = %url, "Polling single message");

        let response = self.get(&url)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(NtfyError::NotFound(message_id.to_string()));
        }
        let body = check_status(&url, response)?.text()?;
        parse_message(&body)?.ok_or_else(|| NtfyError::NotFound(message_id.to_string()))
    }
}

impl Publish for ApiClient {
    fn publish(&self, subscription: &Subscription, request: &PublishRequest) -> Result<()> {
        let url = subscription.url();
        debug!(subscription = %subscription.id, url = %url, "Publishing");

        let mut builder = self
            .client
            .post(&url)
            .header("Priority", request.priority.to_string());
        if let Some(title) = &request.title {
            builder = builder.header("Title", title.as_str());
        }
        if let Some(tags) = request.tags_header() {
            builder = builder.header("Tags", tags);
        }

        let result = builder
            .body(request.message.clone().into_bytes())
            .send()
            .map_err(NtfyError::from)
            .and_then(|response| check_status(&url, response));

        match result {
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Publishing message succeeded");
                Ok(())
            }
            Err(e) => {
                error!(url = %url, error = %e, "Error publishing message");
                Err(e)
            }
        }
    }
}
