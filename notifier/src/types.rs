//! Core types for issue change detection.
//!
//! This module defines the tracked [`Item`] as read from the issue store,
//! its [`Status`], the status transition table, and the [`Event`] values the
//! diff engine hands to the dispatcher. Store records use snake_case JSON
//! keys; unknown keys are ignored.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Directive that assigns an item to an agent from within a comment.
pub const ASSIGN_DIRECTIVE: &str = "@assigned";

/// Lifecycle status of an item.
///
/// Only `open`, `in_progress` and `closed` carry meaning for change
/// detection; any other value is preserved verbatim as [`Status::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Closed,
    Other(String),
}

impl Status {
    /// Returns the wire representation of this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
            Self::Other(s) => s,
        }
    }

    /// Returns `true` for statuses that count as outstanding work.
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "open" => Self::Open,
            "in_progress" => Self::InProgress,
            "closed" => Self::Closed,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comment attached to an item.
///
/// The store writes comments as objects with a `text` field; bare strings
/// are accepted as well. Anything else is kept but never matches a
/// directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Comment {
    Record {
        #[serde(default)]
        text: String,
    },
    Text(String),
    Other(serde_json::Value),
}

impl Comment {
    /// Returns the comment text, or an empty string for unrecognized shapes.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Record { text } | Self::Text(text) => text,
            Self::Other(_) => "",
        }
    }
}

fn default_priority() -> i64 {
    2
}

fn default_issue_type() -> String {
    "task".to_string()
}

/// Reads an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_priority<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_else(default_priority))
}

fn null_as_default_issue_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_issue_type))
}

/// A tracked unit of work, parsed fresh from the store on every scan.
///
/// An explicit `null` in any field reads the same as the field being absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Missing ids deserialize as empty and are rejected by the store parser.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub status: Status,

    #[serde(default = "default_priority", deserialize_with = "null_as_default_priority")]
    pub priority: i64,

    #[serde(
        default = "default_issue_type",
        deserialize_with = "null_as_default_issue_type"
    )]
    pub issue_type: String,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub closed_at: Option<String>,

    #[serde(default)]
    pub close_reason: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
}

impl Item {
    /// Creates an item with the given identity and defaults elsewhere.
    ///
    /// # Examples
    ///
    /// ```
    /// use beads_notifier::types::{Item, Status};
    ///
    /// let item = Item::new("X-1", "Fix bug", Status::Open);
    /// assert_eq!(item.priority, 2);
    /// assert_eq!(item.issue_type, "task");
    /// assert_eq!(item.assigned_agent(), None);
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: Status) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status,
            priority: default_priority(),
            issue_type: default_issue_type(),
            owner: None,
            assignee: None,
            created_at: None,
            updated_at: None,
            closed_at: None,
            close_reason: None,
            comments: Vec::new(),
        }
    }

    /// Sets the explicit assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Appends a comment.
    #[must_use]
    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comments.push(Comment::Record { text: text.into() });
        self
    }

    /// The agent responsible for this item. See [`resolve_assignee`].
    #[must_use]
    pub fn assigned_agent(&self) -> Option<String> {
        resolve_assignee(self)
    }
}

/// Resolves the agent responsible for `item`.
///
/// Precedence:
/// 1. the explicit, non-empty `assignee` field;
/// 2. the newest comment containing `@assigned <token>`, where at least one
///    whitespace character separates the directive from the token and the
///    token runs to the next whitespace;
/// 3. none.
///
/// # Examples
///
/// ```
/// use beads_notifier::types::{resolve_assignee, Item, Status};
///
/// let item = Item::new("X-1", "t", Status::Open)
///     .with_comment("@assigned alice")
///     .with_comment("handing over, @assigned bob thanks");
/// assert_eq!(resolve_assignee(&item).as_deref(), Some("bob"));
///
/// let explicit = item.clone().with_assignee("carol");
/// assert_eq!(resolve_assignee(&explicit).as_deref(), Some("carol"));
/// ```
#[must_use]
pub fn resolve_assignee(item: &Item) -> Option<String> {
    if let Some(assignee) = item.assignee.as_deref().filter(|a| !a.is_empty()) {
        return Some(assignee.to_string());
    }

    item.comments
        .iter()
        .rev()
        .find_map(|comment| find_directive(comment.text()))
        .map(str::to_string)
}

/// Returns the token of the first well-formed `@assigned` directive in `text`.
fn find_directive(text: &str) -> Option<&str> {
    text.match_indices(ASSIGN_DIRECTIVE).find_map(|(start, _)| {
        let rest = &text[start + ASSIGN_DIRECTIVE.len()..];
        let trimmed = rest.trim_start();
        if trimmed.len() == rest.len() || trimmed.is_empty() {
            return None;
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        Some(&trimmed[..end])
    })
}

/// A status change that produces an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    WorkStarted,
    Completed,
}

impl TransitionKind {
    /// Maps `(old, new)` to the transition it represents, if any.
    ///
    /// | old            | new           | result        |
    /// |----------------|---------------|---------------|
    /// | not in progress| `in_progress` | `WorkStarted` |
    /// | not closed     | `closed`      | `Completed`   |
    /// | anything else  |               | `None`        |
    #[must_use]
    pub fn from_statuses(old: &Status, new: &Status) -> Option<Self> {
        match (old, new) {
            (Status::InProgress, Status::InProgress) | (Status::Closed, Status::Closed) => None,
            (_, Status::InProgress) => Some(Self::WorkStarted),
            (_, Status::Closed) => Some(Self::Completed),
            (_, Status::Open | Status::Other(_)) => None,
        }
    }
}

/// Notification categories, each with an independent enable switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Created,
    WorkStarted,
    Completed,
    AssigneeAllComplete,
    /// Raised by the one-shot CLI, never by change detection.
    ReviewRequest,
}

impl EventKind {
    /// All kinds, in configuration order.
    pub const ALL: [EventKind; 5] = [
        Self::Created,
        Self::WorkStarted,
        Self::Completed,
        Self::AssigneeAllComplete,
        Self::ReviewRequest,
    ];

    /// The configuration key for this kind (`notify_on.<key>`).
    #[must_use]
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::WorkStarted => "in_progress",
            Self::Completed => "closed",
            Self::AssigneeAllComplete => "agent_complete",
            Self::ReviewRequest => "review_request",
        }
    }

    /// Parses a configuration key.
    #[must_use]
    pub fn from_config_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.config_key() == key)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// A classified change detected between two scans.
///
/// Events are built per scan and consumed once by the dispatcher; they are
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The item was not present in the previous snapshot.
    Created { item: Item },

    /// The item moved into `in_progress`.
    WorkStarted { item: Item, from: Status },

    /// The item moved into `closed`.
    Completed { item: Item, from: Status },

    /// Closing an item left `agent` with no outstanding work.
    AssigneeAllComplete { agent: String, items: Vec<Item> },
}

impl Event {
    /// Returns the notification category of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created { .. } => EventKind::Created,
            Self::WorkStarted { .. } => EventKind::WorkStarted,
            Self::Completed { .. } => EventKind::Completed,
            Self::AssigneeAllComplete { .. } => EventKind::AssigneeAllComplete,
        }
    }

    /// Short identifying label for logging.
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::Created { item } | Self::WorkStarted { item, .. } | Self::Completed { item, .. } => {
                &item.id
            }
            Self::AssigneeAllComplete { agent, .. } => agent,
        }
    }
}
