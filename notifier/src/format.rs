//! Rendering of events and agent updates into chat notifications.
//!
//! Every renderer produces a plain-text summary plus Slack-style blocks
//! (`section` and `context`). Every free-text value taken from an item or
//! from the command line passes through [`sanitize`] with a per-field
//! limit before it is placed into the message:
//!
//! | Field | Limit |
//! |-------|-------|
//! | title | 200 |
//! | id, agent, issue | 100 |
//! | id and title in agent-complete lists | 50 |
//! | type | 50 |
//! | close reason | 200 |
//! | agent update message | 1000 (status update 2000) |

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Value};

use crate::sanitize::{
    sanitize, sanitize_opt, ID_MAX_LEN, LONG_MESSAGE_MAX_LEN, MESSAGE_MAX_LEN, SHORT_ID_MAX_LEN,
    TITLE_MAX_LEN,
};
use crate::types::{Event, EventKind, Item};

/// Limit for the free-form issue type tag.
const TYPE_MAX_LEN: usize = 50;

/// Limit for close reasons.
const REASON_MAX_LEN: usize = 200;

/// Items listed in the plain-text agent-complete summary.
pub const TEXT_LIST_LIMIT: usize = 10;

/// Items listed in the block form of the agent-complete summary.
pub const BLOCK_LIST_LIMIT: usize = 5;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Human-readable summary, also the fallback for clients without blocks.
    pub text: String,

    /// Structured blocks, if any.
    pub blocks: Option<Vec<Value>>,
}

impl Notification {
    /// A text-only notification.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
        }
    }

    fn with_blocks(text: String, blocks: Vec<Value>) -> Self {
        Self {
            text,
            blocks: Some(blocks),
        }
    }
}

fn mrkdwn(text: impl Into<String>) -> Value {
    json!({ "type": "mrkdwn", "text": text.into() })
}

fn section(text: impl Into<String>) -> Value {
    json!({ "type": "section", "text": mrkdwn(text) })
}

fn fields(items: Vec<Value>) -> Value {
    json!({ "type": "section", "fields": items })
}

fn context(elements: Vec<Value>) -> Value {
    json!({ "type": "context", "elements": elements })
}

/// Sanitized assigned agent of `item`.
fn agent_of(item: &Item) -> Option<String> {
    sanitize_opt(item.assigned_agent().as_deref(), ID_MAX_LEN)
}

/// Renders a change-detection event.
#[must_use]
pub fn render(event: &Event) -> Notification {
    match event {
        Event::Created { item } => created(item),
        Event::WorkStarted { item, .. } => work_started(item),
        Event::Completed { item, .. } => completed(item),
        Event::AssigneeAllComplete { agent, items } => agent_complete(agent, items),
    }
}

/// Issue created.
#[must_use]
pub fn created(item: &Item) -> Notification {
    let id = sanitize(&item.id, ID_MAX_LEN);
    let title = sanitize(&item.title, TITLE_MAX_LEN);
    let agent = agent_of(item);
    let priority = format!("P{}", item.priority);

    let agent_line = agent
        .as_deref()
        .map(|a| format!("\n   Assigned to: {a}"))
        .unwrap_or_default();
    let text = format!("Issue Created: {id}\n   \"{title}\"{agent_line}\n   Priority: {priority}");

    let mut details = vec![
        mrkdwn(format!("*Priority:* {priority}")),
        mrkdwn(format!("*Type:* {}", sanitize(&item.issue_type, TYPE_MAX_LEN))),
    ];
    if let Some(agent) = &agent {
        details.push(mrkdwn(format!("*Assigned to:* {agent}")));
    }

    Notification::with_blocks(
        text,
        vec![
            section(format!(":new: *Issue Created:* `{id}`\n\"{title}\"")),
            context(details),
        ],
    )
}

/// Work started on an issue.
#[must_use]
pub fn work_started(item: &Item) -> Notification {
    let id = sanitize(&item.id, ID_MAX_LEN);
    let title = sanitize(&item.title, TITLE_MAX_LEN);
    let agent = agent_of(item);

    let agent_line = agent
        .as_deref()
        .map(|a| format!("\n   Agent: {a}"))
        .unwrap_or_default();
    let text = format!("Work Started: {id}\n   \"{title}\"{agent_line}");

    let mut blocks = vec![section(format!(
        ":arrow_forward: *Work Started:* `{id}`\n\"{title}\""
    ))];
    if let Some(agent) = &agent {
        blocks.push(context(vec![mrkdwn(format!("*Agent:* {agent}"))]));
    }

    Notification::with_blocks(text, blocks)
}

/// Issue completed.
#[must_use]
pub fn completed(item: &Item) -> Notification {
    let id = sanitize(&item.id, ID_MAX_LEN);
    let title = sanitize(&item.title, TITLE_MAX_LEN);
    let agent = agent_of(item);
    let reason = sanitize_opt(item.close_reason.as_deref(), REASON_MAX_LEN);
    let duration = match (&item.created_at, &item.closed_at) {
        (Some(created), Some(closed)) => format_duration(created, closed),
        _ => None,
    };

    let mut text = format!("Completed: {id}\n   \"{title}\"");
    if let Some(duration) = &duration {
        text.push_str(&format!("\n   Duration: {duration}"));
    }
    if let Some(agent) = &agent {
        text.push_str(&format!("\n   Agent: {agent}"));
    }

    let mut blocks = vec![section(format!(
        ":white_check_mark: *Completed:* `{id}`\n\"{title}\""
    ))];

    let mut details = Vec::new();
    if let Some(duration) = &duration {
        details.push(mrkdwn(format!("*Duration:* {duration}")));
    }
    if let Some(agent) = &agent {
        details.push(mrkdwn(format!("*Agent:* {agent}")));
    }
    if !details.is_empty() {
        blocks.push(context(details));
    }
    if let Some(reason) = &reason {
        blocks.push(context(vec![mrkdwn(format!("_{reason}_"))]));
    }

    Notification::with_blocks(text, blocks)
}

/// An agent finished all of its outstanding work.
#[must_use]
pub fn agent_complete(agent: &str, items: &[Item]) -> Notification {
    let agent = sanitize(agent, ID_MAX_LEN);
    let count = items.len();

    let mut text = format!("Agent Completed All Work\n   Agent: {agent}\n   Issues closed: {count}\n");
    let lines: Vec<String> = items
        .iter()
        .take(TEXT_LIST_LIMIT)
        .map(|i| {
            format!(
                "   - {}: {}",
                sanitize(&i.id, SHORT_ID_MAX_LEN),
                sanitize(&i.title, SHORT_ID_MAX_LEN)
            )
        })
        .collect();
    text.push_str(&lines.join("\n"));
    if count > TEXT_LIST_LIMIT {
        text.push_str(&format!("\n   ... and {} more", count - TEXT_LIST_LIMIT));
    }

    let listing: Vec<String> = items
        .iter()
        .take(BLOCK_LIST_LIMIT)
        .map(|i| {
            format!(
                "- `{}`: {}",
                sanitize(&i.id, SHORT_ID_MAX_LEN),
                sanitize(&i.title, SHORT_ID_MAX_LEN)
            )
        })
        .collect();

    let mut blocks = vec![
        section(format!(
            ":tada: *Agent Completed All Work*\n*Agent:* {agent}\n*Issues closed:* {count}"
        )),
        section(listing.join("\n")),
    ];
    if count > BLOCK_LIST_LIMIT {
        blocks.push(context(vec![mrkdwn(format!(
            "_...and {} more_",
            count - BLOCK_LIST_LIMIT
        ))]));
    }

    Notification::with_blocks(text, blocks)
}

/// Out-of-band messages sent by agents through the one-shot CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentUpdate {
    ReviewRequest,
    Blocked,
    StatusUpdate,
    WorkComplete,
}

impl AgentUpdate {
    /// The policy switch governing this update, if any.
    ///
    /// Only review requests can be disabled; the others are always sent.
    #[must_use]
    pub fn event_kind(self) -> Option<EventKind> {
        match self {
            Self::ReviewRequest => Some(EventKind::ReviewRequest),
            Self::Blocked | Self::StatusUpdate | Self::WorkComplete => None,
        }
    }

    fn message_limit(self) -> usize {
        match self {
            Self::StatusUpdate => LONG_MESSAGE_MAX_LEN,
            _ => MESSAGE_MAX_LEN,
        }
    }

    /// Renders the update for `agent`, optionally about `issue`.
    #[must_use]
    pub fn render(self, agent: &str, issue: Option<&str>, message: &str) -> Notification {
        let agent = sanitize(agent, ID_MAX_LEN);
        let issue = sanitize_opt(issue, ID_MAX_LEN);
        let message = sanitize(message, self.message_limit());

        if self == Self::StatusUpdate {
            let issue_suffix = issue
                .as_deref()
                .map(|i| format!(" ({i})"))
                .unwrap_or_default();
            let text = format!("Agent Update [{agent}]{issue_suffix}: {message}");

            let issue_field = issue
                .as_deref()
                .map(|i| format!(" | *Issue:* `{i}`"))
                .unwrap_or_default();
            return Notification::with_blocks(
                text,
                vec![
                    section(format!(
                        ":speech_balloon: *Agent Update*\n*Agent:* {agent}{issue_field}"
                    )),
                    section(message),
                ],
            );
        }

        let (title, emoji, body_line, body_block) = match self {
            Self::ReviewRequest => (
                "Review Requested",
                ":eyes:",
                format!("Message: {message}"),
                format!("*Message:*\n{message}"),
            ),
            Self::Blocked => (
                "Agent Blocked",
                ":no_entry:",
                format!("Blocker: {message}"),
                format!("*Blocker:*\n{message}"),
            ),
            Self::WorkComplete | Self::StatusUpdate => (
                "Work Complete",
                ":white_check_mark:",
                message.clone(),
                message.clone(),
            ),
        };

        let issue_line = issue
            .as_deref()
            .map(|i| format!("\n   Issue: {i}"))
            .unwrap_or_default();
        let text = format!("{title}\n   Agent: {agent}{issue_line}\n   {body_line}");

        let mut who = vec![mrkdwn(format!("*Agent:*\n{agent}"))];
        if let Some(issue) = &issue {
            who.push(mrkdwn(format!("*Issue:*\n`{issue}`")));
        }

        Notification::with_blocks(
            text,
            vec![
                section(format!("{emoji} *{title}*")),
                fields(who),
                section(body_block),
            ],
        )
    }
}

/// Parses an RFC 3339 timestamp, or a naive ISO 8601 one taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Human-readable time between `created` and `closed`.
///
/// Returns `None` if either timestamp does not parse or `closed` precedes
/// `created`.
///
/// # Examples
///
/// ```
/// use beads_notifier::format::format_duration;
///
/// assert_eq!(format_duration("2026-01-01T10:00:00Z", "2026-01-01T10:42:10Z").as_deref(), Some("42m"));
/// assert_eq!(format_duration("2026-01-01T10:00:00Z", "2026-01-01T13:30:00Z").as_deref(), Some("3.5h"));
/// assert_eq!(format_duration("2026-01-01T10:00:00Z", "2026-01-03T15:00:00Z").as_deref(), Some("2d 5h"));
/// assert_eq!(format_duration("yesterday", "2026-01-01T10:00:00Z"), None);
/// ```
#[must_use]
pub fn format_duration(created: &str, closed: &str) -> Option<String> {
    let elapsed = parse_timestamp(closed)? - parse_timestamp(created)?;
    let seconds = elapsed.num_seconds();
    if seconds < 0 {
        return None;
    }

    let hours = seconds as f64 / 3600.0;
    let text = if hours < 1.0 {
        format!("{}m", seconds / 60)
    } else if hours < 24.0 {
        format!("{hours:.1}h")
    } else {
        format!("{}d {}h", seconds / 86_400, (seconds % 86_400) / 3600)
    };
    Some(text)
}
