//! Redaction of webhook credentials in log and console output.
//!
//! A Slack incoming-webhook URL is a bearer credential: anyone holding it can
//! post to the channel. It must never appear in logs, error messages or
//! `check` output. Redaction is applied explicitly at every output boundary
//! (see [`crate::logging::RedactingWriter`] for the log sink).

use std::fmt;

/// Prefix shared by every Slack incoming-webhook URL.
pub const WEBHOOK_PREFIX: &str = "https://hooks.slack.com/services/";

/// Replacement text for masked webhook URLs.
pub const WEBHOOK_MASK: &str = "[WEBHOOK_URL_MASKED]";

/// Replaces every webhook URL in `text` with [`WEBHOOK_MASK`].
///
/// A webhook URL is the [`WEBHOOK_PREFIX`] followed by the longest run of
/// ASCII alphanumerics and `/`.
///
/// # Example
///
/// ```
/// use beads_notifier::redact::redact;
///
/// let msg = "error posting to https://hooks.slack.com/services/T00/B00/XXXX: timeout";
/// assert_eq!(redact(msg), "error posting to [WEBHOOK_URL_MASKED]: timeout");
/// ```
#[must_use]
pub fn redact(text: &str) -> String {
    if !text.contains(WEBHOOK_PREFIX) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(WEBHOOK_PREFIX) {
        out.push_str(&rest[..start]);
        let tail = &rest[start + WEBHOOK_PREFIX.len()..];
        let token_len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '/'))
            .unwrap_or(tail.len());
        out.push_str(WEBHOOK_MASK);
        rest = &tail[token_len..];
    }
    out.push_str(rest);
    out
}

/// Redacts `text`, additionally masking an explicitly configured secret.
///
/// Used where the configured endpoint might not follow the Slack URL shape
/// (for example a proxy or test server).
#[must_use]
pub fn redact_with(text: &str, secret: Option<&str>) -> String {
    let redacted = redact(text);
    match secret {
        Some(secret) if !secret.is_empty() => redacted.replace(secret, WEBHOOK_MASK),
        _ => redacted,
    }
}

/// Masks a webhook URL for display, keeping just enough to identify it.
///
/// # Example
///
/// ```
/// use beads_notifier::redact::mask_url;
///
/// assert_eq!(
///     mask_url("https://hooks.slack.com/services/T0001234/B000/abcdefXYZ9"),
///     "https://hooks.slack.com/services/T000.../XYZ9"
/// );
/// assert_eq!(mask_url(""), "(not set)");
/// ```
#[must_use]
pub fn mask_url(url: &str) -> String {
    if url.is_empty() {
        return "(not set)".to_string();
    }

    if url.contains("hooks.slack.com") {
        let parts: Vec<&str> = url.split('/').collect();
        if parts.len() >= 5 {
            let team = parts[parts.len() - 3];
            let token = parts[parts.len() - 1];
            let team_head: String = team.chars().take(4).collect();
            let token_tail: String = {
                let chars: Vec<char> = token.chars().collect();
                chars[chars.len().saturating_sub(4)..].iter().collect()
            };
            return format!("{WEBHOOK_PREFIX}{team_head}.../{token_tail}");
        }
    }

    if url.chars().count() > 20 {
        let head: String = url.chars().take(20).collect();
        format!("{head}...")
    } else {
        url.to_string()
    }
}

/// A `Display` wrapper that redacts webhook URLs.
#[derive(Clone, Copy)]
pub struct Redacted<'a>(pub &'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact(self.0))
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", redact(self.0))
    }
}
