//! Mail relay transport.
//!
//! POSTs each restore-link message as JSON to an HTTP endpoint that turns
//! it into an email. Any 2xx answer counts as accepted.

use std::time::Duration;

use homeguard_core::notifier::Notifier;
use serde::Serialize;
use tracing::{info, warn};

/// Per-request timeout for the relay.
const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifier that hands messages to an HTTP mail relay.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl WebhookNotifier {
    /// Create a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool {
        let message = RelayMessage {
            to: recipient,
            subject,
            body,
        };

        match self.http.post(&self.url).json(&message).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(status = %resp.status(), "message accepted by mail relay");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "mail relay rejected message");
                false
            }
            Err(e) => {
                warn!(error = %e, "mail relay unreachable");
                false
            }
        }
    }
}
