//! Beads Notifier - issue tracker change watcher.
//!
//! This crate watches a line-delimited JSON issue store, detects lifecycle
//! changes between successive reads, and posts rate-limited, sanitized
//! notifications to a chat webhook.
//!
//! # Overview
//!
//! Every write to the store triggers a full re-read. The fresh items are
//! diffed against a persisted snapshot, which yields events (created, work
//! started, completed, all work of an agent complete). Each event passes the
//! per-kind policy and a sliding-window rate limit before it is delivered
//! exactly once, best effort.
//!
//! # Modules
//!
//! - [`types`]: Items, statuses, events and the transition table
//! - [`store`]: Issue store parsing
//! - [`snapshot`]: Persisted last-seen state and the assignee index
//! - [`diff`]: Change detection
//! - [`format`]: Message rendering
//! - [`sanitize`]: Escaping and truncation of untrusted text
//! - [`redact`]: Webhook URL masking
//! - [`rate_limit`]: Sliding-window rate limiter
//! - [`transport`]: Webhook delivery
//! - [`dispatch`]: Policy, rate limit and delivery in order
//! - [`config`]: Layered configuration and well-known paths
//! - [`secrets`]: Owner-only files and the secrets file
//! - [`pidfile`]: Daemon PID file
//! - [`watcher`]: File change triggers
//! - [`service`]: The scan cycle
//! - [`logging`]: Subscriber setup with a redacting sink
//! - [`error`]: Crate-level error type
//! - [`utils`]: Shared utilities (scan gate)

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod logging;
pub mod pidfile;
pub mod rate_limit;
pub mod redact;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod transport;
pub mod types;
pub mod utils;
pub mod watcher;

pub use config::{Config, ConfigError, NotifyPolicy, Paths};
pub use dispatch::{DispatchOutcome, Dispatcher, SkipReason};
pub use error::{NotifierError, Result};
pub use format::{AgentUpdate, Notification};
pub use rate_limit::RateLimiter;
pub use service::{NotifierService, ScanReport};
pub use transport::{DeliveryError, Payload, Transport, WebhookTransport};
pub use types::{Event, EventKind, Item, Status};
pub use utils::{ScanGate, DEFAULT_SCAN_DEBOUNCE};
pub use watcher::{FileWatcher, WatcherError};
