//! Policy-filtered, rate-limited notification dispatch.
//!
//! For every event the [`Dispatcher`] checks, in order:
//!
//! 1. the per-kind switch in [`NotifyPolicy`]; a disabled kind is skipped
//!    without rendering anything;
//! 2. whether a transport is configured at all;
//! 3. the [`RateLimiter`]; a denied notification is dropped, never queued;
//! 4. the transport itself; a failure is logged and reported, never retried.
//!
//! Nothing here returns an error to the caller: every path ends in a
//! [`DispatchOutcome`], so a failing webhook cannot stop the watcher loop.

use tracing::{debug, info, warn};

use crate::config::{Config, NotifyPolicy};
use crate::format::{self, Notification};
use crate::rate_limit::RateLimiter;
use crate::redact::redact;
use crate::sanitize::{truncate_escaped, DEFAULT_MAX_LEN};
use crate::transport::{DeliveryError, Payload, Transport, WebhookTransport};
use crate::types::{Event, EventKind};

/// Why a notification was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The event kind is switched off.
    Disabled,

    /// No webhook is configured.
    Unconfigured,

    /// The rate limit is exhausted.
    RateLimited,
}

/// Result of dispatching one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Skipped(SkipReason),
    Failed(DeliveryError),
}

impl DispatchOutcome {
    /// Returns `true` if the notification was delivered.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Sends notifications through a [`Transport`].
#[derive(Debug)]
pub struct Dispatcher<T> {
    policy: NotifyPolicy,
    limiter: RateLimiter,
    transport: Option<T>,
    channel: Option<String>,
}

impl<T: Transport> Dispatcher<T> {
    /// Creates a dispatcher with the default rate limit.
    ///
    /// With `transport` set to `None` every enabled notification is skipped
    /// as [`SkipReason::Unconfigured`].
    #[must_use]
    pub fn new(policy: NotifyPolicy, transport: Option<T>, channel: Option<String>) -> Self {
        Self {
            policy,
            limiter: RateLimiter::default(),
            transport,
            channel,
        }
    }

    /// Replaces the rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &NotifyPolicy {
        &self.policy
    }

    /// Returns `true` if a transport is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    /// Renders and sends a change-detection event.
    pub async fn dispatch(&mut self, event: &Event) -> DispatchOutcome {
        let kind = event.kind();
        if !self.policy.allows(kind) {
            debug!(kind = %kind, subject = %event.subject(), "Notification disabled, skipping");
            return DispatchOutcome::Skipped(SkipReason::Disabled);
        }

        self.deliver(Some(kind), event.subject(), format::render(event))
            .await
    }

    /// Sends an already rendered notification.
    ///
    /// `kind` selects the policy switch; `None` means the notification is
    /// always enabled.
    pub async fn send(&mut self, kind: Option<EventKind>, notification: Notification) -> DispatchOutcome {
        if let Some(kind) = kind {
            if !self.policy.allows(kind) {
                debug!(kind = %kind, "Notification disabled, skipping");
                return DispatchOutcome::Skipped(SkipReason::Disabled);
            }
        }

        self.deliver(kind, "-", notification).await
    }

    async fn deliver(
        &mut self,
        kind: Option<EventKind>,
        subject: &str,
        notification: Notification,
    ) -> DispatchOutcome {
        let kind_label = kind.map_or("message", EventKind::config_key);

        let Some(transport) = &self.transport else {
            warn!(kind = kind_label, "No webhook URL configured, skipping notification");
            return DispatchOutcome::Skipped(SkipReason::Unconfigured);
        };

        if !self.limiter.allow() {
            let stats = self.limiter.stats();
            info!(
                kind = kind_label,
                subject = %subject,
                count = stats.count,
                max = stats.max,
                window_secs = stats.window_secs,
                "Rate limit exceeded, dropping notification"
            );
            return DispatchOutcome::Skipped(SkipReason::RateLimited);
        }

        let mut notification = notification;
        notification.text = truncate_escaped(&notification.text, DEFAULT_MAX_LEN);
        let payload = Payload::from_notification(notification, self.channel.clone());

        match transport.deliver(&payload).await {
            Ok(()) => {
                info!(kind = kind_label, subject = %subject, "Sent notification");
                DispatchOutcome::Delivered
            }
            Err(e) => {
                warn!(
                    kind = kind_label,
                    subject = %subject,
                    error = %redact(&e.to_string()),
                    "Failed to send notification"
                );
                DispatchOutcome::Failed(e)
            }
        }
    }
}

impl Dispatcher<WebhookTransport> {
    /// Builds a dispatcher posting to the configured webhook, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, DeliveryError> {
        let transport = config
            .webhook_url
            .as_deref()
            .map(WebhookTransport::new)
            .transpose()?;
        Ok(Self::new(config.policy, transport, config.channel.clone()))
    }
}
