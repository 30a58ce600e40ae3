//! Sanitization of untrusted text before it reaches the chat channel.
//!
//! Issue titles, agent names, close reasons and free-form messages all come
//! from sources the notifier does not control. Slack's `mrkdwn` gives `&`,
//! `<` and `>` structural meaning (`<!channel>`, `<@U123>`, `<url|label>`),
//! so every free-text field passes through [`sanitize`] before it is placed
//! into a message.
//!
//! # Guarantees
//!
//! - The result is never longer than `max_len` characters.
//! - No raw `&`, `<` or `>` survives; each becomes `&amp;`, `&lt;` or `&gt;`.
//! - ASCII control characters are removed, except tab, line feed and
//!   carriage return.
//! - Truncation never cuts an entity in half: the ellipsis is appended after
//!   the last whole character that fits.
//!
//! # Example
//!
//! ```
//! use beads_notifier::sanitize::sanitize;
//!
//! assert_eq!(sanitize("<!channel> ping", 100), "&lt;!channel&gt; ping");
//! assert_eq!(sanitize("abcdefghij", 8), "abcde...");
//! ```

/// Default maximum length for a whole message body.
pub const DEFAULT_MAX_LEN: usize = 3000;

/// Maximum length for issue titles.
pub const TITLE_MAX_LEN: usize = 200;

/// Maximum length for identifiers (issue ids, agent tokens).
pub const ID_MAX_LEN: usize = 100;

/// Maximum length for identifiers inside compact lists.
pub const SHORT_ID_MAX_LEN: usize = 50;

/// Maximum length for free-form messages.
pub const MESSAGE_MAX_LEN: usize = 1000;

/// Maximum length for long status-update messages.
pub const LONG_MESSAGE_MAX_LEN: usize = 2000;

const ELLIPSIS: &str = "...";

/// Returns `true` for characters that are stripped from sanitized output.
///
/// Covers `0x00-0x08`, `0x0B`, `0x0C`, `0x0E-0x1F` and `0x7F`; tab, line feed
/// and carriage return are kept.
#[must_use]
pub fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

/// Escaped form of a single character.
fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    }
}

/// Sanitizes `text` for safe inclusion in a chat message.
///
/// See the [module documentation](self) for the exact guarantees.
#[must_use]
pub fn sanitize(text: &str, max_len: usize) -> String {
    if text.is_empty() || max_len == 0 {
        return String::new();
    }

    // Escaped pieces, one per kept source character, with their char counts.
    let mut pieces: Vec<(char, usize)> = Vec::with_capacity(text.len());
    let mut total = 0usize;
    for c in text.chars().filter(|c| !is_stripped_control(*c)) {
        let width = escape_char(c).map_or(1, str::len);
        total += width;
        pieces.push((c, width));
    }

    let mut out = String::with_capacity(total.min(max_len) + ELLIPSIS.len());

    if total <= max_len {
        for (c, _) in pieces {
            push_escaped(&mut out, c);
        }
        return out;
    }

    if max_len <= ELLIPSIS.len() {
        out.push_str(&ELLIPSIS[..max_len]);
        return out;
    }

    let budget = max_len - ELLIPSIS.len();
    let mut used = 0usize;
    for (c, width) in pieces {
        if used + width > budget {
            break;
        }
        push_escaped(&mut out, c);
        used += width;
    }
    out.push_str(ELLIPSIS);
    out
}

fn push_escaped(out: &mut String, c: char) {
    match escape_char(c) {
        Some(entity) => out.push_str(entity),
        None => out.push(c),
    }
}

/// Sanitizes an optional field, returning `None` for missing or empty input.
#[must_use]
pub fn sanitize_opt(text: Option<&str>, max_len: usize) -> Option<String> {
    text.filter(|t| !t.is_empty())
        .map(|t| sanitize(t, max_len))
        .filter(|t| !t.is_empty())
}

/// Caps already-sanitized text at `max_len` characters.
///
/// Unlike [`sanitize`] this does not escape again; it only makes sure the
/// cut does not land inside an entity produced by an earlier [`sanitize`]
/// call, backing up to the entity's `&` when it would.
#[must_use]
pub fn truncate_escaped(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    if max_len <= ELLIPSIS.len() {
        return ELLIPSIS[..max_len].to_string();
    }

    let budget = max_len - ELLIPSIS.len();
    let cut = text
        .char_indices()
        .nth(budget)
        .map_or(text.len(), |(i, _)| i);
    let mut kept = &text[..cut];

    if let Some(amp) = kept.rfind('&') {
        if !kept[amp..].contains(';') {
            kept = &kept[..amp];
        }
    }

    format!("{kept}{ELLIPSIS}")
}
