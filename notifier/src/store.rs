//! Parsing of the line-delimited issue store.
//!
//! The store is an append-only JSONL file written by the issue tracker. Each
//! line is one complete [`Item`]; a later line for the same id supersedes an
//! earlier one. The file may be mid-append when it is read, so a partial or
//! malformed line is skipped with a warning rather than failing the scan.
//!
//! # Failure modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | file missing or unreadable | [`ReadError`]: the whole scan is skipped |
//! | blank line | ignored |
//! | invalid UTF-8, invalid JSON, missing or empty `id` | [`ParseError`]: line skipped, counted |
//!
//! # Example
//!
//! ```
//! use beads_notifier::store::parse_lines;
//!
//! let parsed = parse_lines("{\"id\":\"X-1\",\"title\":\"Fix bug\"}\nnot json\n");
//! assert_eq!(parsed.items.len(), 1);
//! assert_eq!(parsed.skipped, 1);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::Item;

/// The store file could not be read at all.
#[derive(Error, Debug)]
#[error("cannot read issue store {}: {source}", .path.display())]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A single store line could not be turned into an item.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The line is not a JSON object matching the item shape.
    #[error("line {line}: invalid JSON: {source}")]
    InvalidJson {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The line is not valid UTF-8, typically a write cut mid-character.
    #[error("line {line}: invalid UTF-8")]
    InvalidUtf8 { line: usize },

    /// The record has no usable identity.
    #[error("line {line}: record has no id")]
    MissingId { line: usize },
}

/// Items parsed from one read of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStore {
    /// Current items keyed by id, in id order.
    pub items: BTreeMap<String, Item>,

    /// Number of malformed lines that were skipped.
    pub skipped: usize,
}

/// Reads and parses the store at `path`.
///
/// # Errors
///
/// Returns [`ReadError`] if the file does not exist or cannot be read.
/// Malformed lines are never an error; see [`parse_lines`].
pub fn parse_store(path: &Path) -> Result<ParsedStore, ReadError> {
    let contents = std::fs::read(path).map_err(|source| ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed = parse_bytes(&contents);
    debug!(
        path = %path.display(),
        items = parsed.items.len(),
        skipped = parsed.skipped,
        "Parsed issue store"
    );
    Ok(parsed)
}

/// Parses store contents already in memory.
///
/// Each malformed line is logged at `warn` and counted in
/// [`ParsedStore::skipped`].
#[must_use]
pub fn parse_lines(contents: &str) -> ParsedStore {
    parse_bytes(contents.as_bytes())
}

/// Parses raw store bytes. Lines are split on `\n` before decoding, so one
/// line with invalid UTF-8 is skipped without affecting the others.
#[must_use]
pub fn parse_bytes(contents: &[u8]) -> ParsedStore {
    let mut parsed = ParsedStore::default();

    for (index, raw) in contents.split(|&b| b == b'\n').enumerate() {
        let line_no = index + 1;
        let result = std::str::from_utf8(raw)
            .map_err(|_| ParseError::InvalidUtf8 { line: line_no })
            .and_then(|line| {
                let line = line.trim();
                if line.is_empty() {
                    Ok(None)
                } else {
                    parse_line(line_no, line).map(Some)
                }
            });

        match result {
            Ok(Some(item)) => {
                parsed.items.insert(item.id.clone(), item);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Skipping malformed issue record");
                parsed.skipped += 1;
            }
        }
    }

    parsed
}

/// Parses one non-blank line. `line_no` is 1-based and used for errors only.
///
/// # Errors
///
/// Returns [`ParseError`] for invalid JSON or a missing/empty `id`.
pub fn parse_line(line_no: usize, line: &str) -> Result<Item, ParseError> {
    let item: Item = serde_json::from_str(line).map_err(|source| ParseError::InvalidJson {
        line: line_no,
        source,
    })?;

    if item.id.trim().is_empty() {
        return Err(ParseError::MissingId { line: line_no });
    }

    Ok(item)
}
