//! Configuration for the Beads notifier.
//!
//! Settings come from three layers. The webhook URL is taken from the first
//! layer that provides a non-empty value:
//!
//! 1. the secrets file (`.secrets/slack_webhook`, mode `0600`);
//! 2. `webhook_url` in the YAML config file (`.beads/slack_config.yaml`),
//!    where a value of the form `${VAR}` is read from the environment;
//! 3. the `SLACK_WEBHOOK_URL` environment variable.
//!
//! `channel` and `notify_on` only come from the YAML file.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `AI_CODING_UTILS_BASE` | No | current dir | Base directory holding `.beads/` and `.secrets/` |
//! | `SLACK_WEBHOOK_URL` | No | - | Webhook URL, lowest precedence |
//! | `BEADS_AGENT_ID` | No | hostname | Agent name used by `beads-notify` |
//! | `BEADS_ISSUE_ID` | No | - | Default issue for `beads-notify` |
//!
//! # Config file
//!
//! ```yaml
//! webhook_url: ${MY_TEAM_WEBHOOK}
//! channel: "#agents"
//! notify_on:
//!   created: true
//!   in_progress: true
//!   closed: false
//!   agent_complete: true
//!   review_request: true
//! ```
//!
//! `notify_on` may also be a list of enabled keys (`[created, closed]`), in
//! which case every key not listed is disabled.
//!
//! # Example
//!
//! ```no_run
//! use beads_notifier::config::{Config, Paths};
//!
//! let paths = Paths::from_env();
//! let config = Config::load(&paths.secrets, &paths.config).expect("Failed to load configuration");
//! println!("Webhook configured: {}", config.webhook_url.is_some());
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::secrets;
use crate::types::EventKind;

/// Base directory override.
pub const ENV_BASE_DIR: &str = "AI_CODING_UTILS_BASE";

/// Lowest-precedence webhook source.
pub const ENV_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

/// Agent name for one-shot notifications.
pub const ENV_AGENT_ID: &str = "BEADS_AGENT_ID";

/// Default issue for one-shot notifications.
pub const ENV_ISSUE_ID: &str = "BEADS_ISSUE_ID";

/// Tracker directory relative to the base directory.
const BEADS_DIR: &str = ".beads";

/// Secrets directory relative to the base directory.
const SECRETS_DIR: &str = ".secrets";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML or has the wrong shape.
    #[error("malformed config file {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    /// No layer provided a webhook URL.
    #[error("no webhook URL configured")]
    NoWebhook,
}

/// Well-known file locations under a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Base directory.
    pub base: PathBuf,

    /// The issue store (`.beads/issues.jsonl`).
    pub issues: PathBuf,

    /// YAML config file (`.beads/slack_config.yaml`).
    pub config: PathBuf,

    /// Daemon PID file (`.beads/slack_notifier.pid`).
    pub pid: PathBuf,

    /// Daemon log file (`.beads/slack_notifier.log`).
    pub log: PathBuf,

    /// Persisted snapshot (`.beads/slack_notifier_state.json`).
    pub state: PathBuf,

    /// Webhook secret (`.secrets/slack_webhook`).
    pub secrets: PathBuf,
}

impl Paths {
    /// Lays out every path under `base`.
    #[must_use]
    pub fn from_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let beads = base.join(BEADS_DIR);
        Self {
            issues: beads.join("issues.jsonl"),
            config: beads.join("slack_config.yaml"),
            pid: beads.join("slack_notifier.pid"),
            log: beads.join("slack_notifier.log"),
            state: beads.join("slack_notifier_state.json"),
            secrets: base.join(SECRETS_DIR).join("slack_webhook"),
            base,
        }
    }

    /// Uses `AI_CODING_UTILS_BASE` if set, else the current directory.
    #[must_use]
    pub fn from_env() -> Self {
        let base = env::var_os(ENV_BASE_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_base(base)
    }

    /// The tracker directory (`.beads`).
    #[must_use]
    pub fn beads_dir(&self) -> PathBuf {
        self.base.join(BEADS_DIR)
    }
}

/// Per-kind enable switches. Everything is enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyPolicy {
    pub created: bool,
    pub work_started: bool,
    pub completed: bool,
    pub agent_complete: bool,
    pub review_request: bool,
}

impl NotifyPolicy {
    /// Every kind enabled.
    #[must_use]
    pub fn all_enabled() -> Self {
        Self {
            created: true,
            work_started: true,
            completed: true,
            agent_complete: true,
            review_request: true,
        }
    }

    /// Every kind disabled.
    #[must_use]
    pub fn all_disabled() -> Self {
        Self {
            created: false,
            work_started: false,
            completed: false,
            agent_complete: false,
            review_request: false,
        }
    }

    /// Returns whether notifications of `kind` are enabled.
    #[must_use]
    pub fn allows(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Created => self.created,
            EventKind::WorkStarted => self.work_started,
            EventKind::Completed => self.completed,
            EventKind::AssigneeAllComplete => self.agent_complete,
            EventKind::ReviewRequest => self.review_request,
        }
    }

    /// Enables or disables `kind`.
    pub fn set(&mut self, kind: EventKind, enabled: bool) {
        let slot = match kind {
            EventKind::Created => &mut self.created,
            EventKind::WorkStarted => &mut self.work_started,
            EventKind::Completed => &mut self.completed,
            EventKind::AssigneeAllComplete => &mut self.agent_complete,
            EventKind::ReviewRequest => &mut self.review_request,
        };
        *slot = enabled;
    }

    /// Returns a copy with `kind` switched.
    #[must_use]
    pub fn with(mut self, kind: EventKind, enabled: bool) -> Self {
        self.set(kind, enabled);
        self
    }
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self::all_enabled()
    }
}

/// Where the webhook URL was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookSource {
    SecretsFile,
    ConfigFile,
    Environment,
}

impl std::fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SecretsFile => "secrets file",
            Self::ConfigFile => "config file",
            Self::Environment => "environment",
        })
    }
}

/// `notify_on` as written in the YAML file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NotifyOn {
    Switches(BTreeMap<String, bool>),
    Enabled(Vec<String>),
}

impl NotifyOn {
    fn into_policy(self) -> NotifyPolicy {
        match self {
            Self::Switches(map) => {
                let mut policy = NotifyPolicy::all_enabled();
                for (key, enabled) in map {
                    match EventKind::from_config_key(&key) {
                        Some(kind) => policy.set(kind, enabled),
                        None => warn!(key = %key, "Ignoring unknown notify_on key"),
                    }
                }
                policy
            }
            Self::Enabled(list) => {
                let mut policy = NotifyPolicy::all_disabled();
                for key in list {
                    match EventKind::from_config_key(&key) {
                        Some(kind) => policy.set(kind, true),
                        None => warn!(key = %key, "Ignoring unknown notify_on entry"),
                    }
                }
                policy
            }
        }
    }
}

/// The YAML config file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    webhook_url: Option<String>,

    #[serde(default)]
    channel: Option<String>,

    #[serde(default)]
    notify_on: Option<NotifyOn>,
}

/// Resolved notifier configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Webhook URL, if any layer provided one.
    pub webhook_url: Option<String>,

    /// Which layer provided the webhook URL.
    pub webhook_source: Option<WebhookSource>,

    /// Channel override sent with every payload.
    pub channel: Option<String>,

    /// Per-kind switches.
    pub policy: NotifyPolicy,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "webhook_url",
                &self.webhook_url.as_deref().map(crate::redact::mask_url),
            )
            .field("webhook_source", &self.webhook_source)
            .field("channel", &self.channel)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Config {
    /// A configuration that sends nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            webhook_url: None,
            webhook_source: None,
            channel: None,
            policy: NotifyPolicy::default(),
        }
    }

    /// Resolves configuration from the secrets file, the config file and the
    /// environment.
    ///
    /// A missing webhook is not an error here; see [`Config::require_webhook`].
    /// Secrets-file read failures are logged and the next layer is tried.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the config file exists but cannot be read
    /// or parsed.
    pub fn load(secrets_path: &Path, config_path: &Path) -> Result<Self, ConfigError> {
        match Self::resolve(secrets_path, config_path) {
            (config, None) => Ok(config),
            (_, Some(e)) => Err(e),
        }
    }

    /// Resolves configuration like [`Config::load`], but skips a config file
    /// that cannot be read or parsed.
    ///
    /// The error is logged and the file layer contributes nothing: the
    /// webhook still comes from the secrets file or the environment, and
    /// every notification kind stays enabled.
    #[must_use]
    pub fn load_or_skip_file(secrets_path: &Path, config_path: &Path) -> Self {
        let (config, file_error) = Self::resolve(secrets_path, config_path);
        if let Some(e) = file_error {
            warn!(error = %e, "Ignoring config file, using default settings");
        }
        config
    }

    /// Walks every layer. A config-file error is returned alongside the
    /// configuration built from the remaining layers.
    fn resolve(secrets_path: &Path, config_path: &Path) -> (Self, Option<ConfigError>) {
        let mut config = Self::disabled();
        let mut file_error = None;

        match secrets::read_secret(secrets_path) {
            Ok(Some(url)) => {
                info!("Loaded webhook URL from secrets file");
                config.webhook_url = Some(url);
                config.webhook_source = Some(WebhookSource::SecretsFile);
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "Failed to read secrets file"),
        }

        let file = read_file_config(config_path).unwrap_or_else(|e| {
            file_error = Some(e);
            None
        });
        if let Some(file) = file {
            if config.webhook_url.is_none() {
                if let Some(url) = file.webhook_url.as_deref().and_then(expand_placeholder) {
                    config.webhook_url = Some(url);
                    config.webhook_source = Some(WebhookSource::ConfigFile);
                }
            }
            config.channel = file.channel.filter(|c| !c.trim().is_empty());
            if let Some(notify_on) = file.notify_on {
                config.policy = notify_on.into_policy();
            }
        }

        if config.webhook_url.is_none() {
            if let Some(url) = non_empty_env(ENV_WEBHOOK_URL) {
                config.webhook_url = Some(url);
                config.webhook_source = Some(WebhookSource::Environment);
            }
        }

        debug!(config = ?config, "Resolved configuration");
        (config, file_error)
    }

    /// Returns the webhook URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoWebhook`] if none is configured.
    pub fn require_webhook(&self) -> Result<&str, ConfigError> {
        self.webhook_url.as_deref().ok_or(ConfigError::NoWebhook)
    }
}

/// Reads the YAML config file. A missing or empty file yields `None`.
fn read_file_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    secrets::harden(path);

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(None);
    }

    serde_yaml::from_str::<Option<FileConfig>>(&contents).map_err(|e| ConfigError::Malformed {
        path: path.to_path_buf(),
        message: crate::redact::redact(&e.to_string()),
    })
}

/// Resolves a `${VAR}` placeholder; other values pass through.
///
/// Returns `None` for empty values and unset variables.
fn expand_placeholder(raw: &str) -> Option<String> {
    let raw = raw.trim();
    match raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        Some(var) => non_empty_env(var),
        None if raw.is_empty() => None,
        None => Some(raw.to_string()),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The agent name for one-shot notifications: `BEADS_AGENT_ID` or the
/// hostname.
#[must_use]
pub fn agent_id() -> String {
    non_empty_env(ENV_AGENT_ID).unwrap_or_else(get_hostname)
}

/// The default issue for one-shot notifications, from `BEADS_ISSUE_ID`.
#[must_use]
pub fn current_issue() -> Option<String> {
    non_empty_env(ENV_ISSUE_ID)
}

/// Gets the system hostname, falling back to "unknown" if it cannot be determined.
fn get_hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown".to_string())
}
