//! Outbound delivery of notifications to a chat webhook.
//!
//! The dispatcher only depends on the [`Transport`] trait; [`WebhookTransport`]
//! is the production implementation posting JSON with `reqwest`.
//!
//! - One attempt per notification, no retries
//! - 10 second request timeout; a timeout is a failure like any other
//! - HTTP 200 is success, every other status is [`DeliveryError::Status`]
//! - Error messages never contain the endpoint
//!
//! # Example
//!
//! ```no_run
//! use beads_notifier::transport::{Payload, Transport, WebhookTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = WebhookTransport::new("https://hooks.slack.com/services/T/B/X").unwrap();
//!     let payload = Payload::text("hello");
//!     if let Err(e) = transport.deliver(&payload).await {
//!         eprintln!("delivery failed: {e}");
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::format::Notification;
use crate::redact::{mask_url, redact_with};

/// HTTP request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while delivering a payload.
///
/// Messages are redacted: they never include the webhook URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The request did not complete within [`REQUEST_TIMEOUT`].
    #[error("request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    /// The request failed before a response was received.
    #[error("request failed: {0}")]
    Request(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// The JSON body sent to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Payload {
    /// A text-only payload for the default channel.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
            channel: None,
        }
    }

    /// Builds a payload from a rendered notification.
    #[must_use]
    pub fn from_notification(notification: Notification, channel: Option<String>) -> Self {
        Self {
            text: notification.text,
            blocks: notification.blocks.filter(|b| !b.is_empty()),
            channel,
        }
    }
}

/// Something that can deliver a payload.
pub trait Transport {
    /// Delivers `payload` once.
    fn deliver(&self, payload: &Payload) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Posts payloads to an incoming-webhook URL.
#[derive(Clone)]
pub struct WebhookTransport {
    client: Client,
    url: String,
}

impl WebhookTransport {
    /// Creates a transport for `url` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Client`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, DeliveryError> {
        Self::with_timeout(url, REQUEST_TIMEOUT)
    }

    /// Creates a transport with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Client`] if the HTTP client cannot be built.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Client(redact_with(&e.without_url().to_string(), Some(&url))))?;

        Ok(Self { client, url })
    }

    fn request_error(&self, e: reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            return DeliveryError::Timeout;
        }
        DeliveryError::Request(redact_with(&e.without_url().to_string(), Some(&self.url)))
    }
}

impl fmt::Debug for WebhookTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookTransport")
            .field("url", &mask_url(&self.url))
            .finish_non_exhaustive()
    }
}

impl Transport for WebhookTransport {
    async fn deliver(&self, payload: &Payload) -> Result<(), DeliveryError> {
        debug!(
            text_len = payload.text.len(),
            blocks = payload.blocks.as_ref().map_or(0, Vec::len),
            "Posting notification"
        );

        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(DeliveryError::Status(status.as_u16())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::WEBHOOK_MASK;

    #[test]
    fn payload_omits_absent_fields() {
        let json = serde_json::to_value(Payload::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi" }));
    }

    #[test]
    fn payload_from_notification_keeps_blocks_and_channel() {
        let notification = crate::format::AgentUpdate::Blocked.render("a", None, "m");
        let payload = Payload::from_notification(notification, Some("#ops".into()));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["channel"], "#ops");
        assert_eq!(json["blocks"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn empty_blocks_are_dropped() {
        let notification = Notification {
            text: "t".into(),
            blocks: Some(Vec::new()),
        };
        assert_eq!(Payload::from_notification(notification, None).blocks, None);
    }

    #[test]
    fn debug_output_masks_url() {
        let transport =
            WebhookTransport::new("https://hooks.slack.com/services/T0000/B0000/SECRETTOKEN").unwrap();
        let shown = format!("{transport:?}");
        assert!(!shown.contains("SECRETTOKEN"));
        assert!(!shown.contains(WEBHOOK_MASK));
        assert!(shown.contains("T000..."));
    }

    #[tokio::test]
    async fn connection_failure_does_not_leak_url() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let url = "http://127.0.0.1:9/services/T0000/B0000/SECRETTOKEN";
        let transport = WebhookTransport::with_timeout(url, Duration::from_secs(2)).unwrap();

        let err = transport.deliver(&Payload::text("hi")).await.unwrap_err();
        let shown = err.to_string();
        assert!(!shown.contains("SECRETTOKEN"), "leaked: {shown}");
        assert!(!shown.contains("127.0.0.1:9"), "leaked: {shown}");
    }
}
