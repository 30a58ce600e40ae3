//! File watcher that turns writes to the issue store into scan triggers.
//!
//! The store is usually rewritten by replacing the file, so the watch is
//! placed on the store's parent directory (non-recursively) and events are
//! filtered down to the store's file name.
//!
//! The notify callback runs on notify's own thread and is kept lightweight:
//! it only filters events and forwards a unit trigger with `try_send`. A full
//! channel means a trigger is already pending, so the extra one is dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tokio::sync::mpsc;
//! use beads_notifier::watcher::FileWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::channel(16);
//!     let _watcher = FileWatcher::new(PathBuf::from(".beads/issues.jsonl"), tx)?;
//!
//!     while rx.recv().await.is_some() {
//!         println!("store changed");
//!     }
//!     Ok(())
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{
    event::ModifyKind, Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace};

/// Errors that can occur while setting up the watch.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The store's directory does not exist.
    #[error("watch directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The store path has no file name component.
    #[error("not a file path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Watches a single file and emits a trigger whenever it is created or
/// modified.
///
/// Dropping the watcher stops the watch.
#[derive(Debug)]
pub struct FileWatcher {
    /// Kept alive to maintain the watch subscription.
    _watcher: RecommendedWatcher,

    path: PathBuf,
}

impl FileWatcher {
    /// Starts watching `path`.
    ///
    /// The file itself may be missing; its parent directory must exist.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::DirectoryNotFound`] if the parent directory is
    /// missing, [`WatcherError::InvalidPath`] if `path` has no file name, or
    /// [`WatcherError::WatcherInit`] if the platform watcher fails.
    pub fn new(path: PathBuf, trigger: mpsc::Sender<()>) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| WatcherError::InvalidPath(path.clone()))?;

        let dir = match path.parent() {
            Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
            Some(p) => p.to_path_buf(),
            None => return Err(WatcherError::InvalidPath(path)),
        };
        if !dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(dir));
        }

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &file_name, &trigger);
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!(path = %path.display(), "Watching issue store");

        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    /// The watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns `true` if `event` is a create or modify of `file_name`.
fn is_store_change(event: &Event, file_name: &OsString) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
    );

    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == file_name))
}

fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    file_name: &OsString,
    trigger: &mpsc::Sender<()>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    if !is_store_change(&event, file_name) {
        trace!(kind = ?event.kind, paths = ?event.paths, "Ignoring event");
        return;
    }

    match trigger.try_send(()) {
        Ok(()) => trace!(kind = ?event.kind, "Queued scan trigger"),
        Err(TrySendError::Full(())) => trace!("Scan trigger already pending"),
        Err(TrySendError::Closed(())) => debug!("Trigger channel closed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    fn store_name() -> OsString {
        OsString::from("issues.jsonl")
    }

    #[test]
    fn create_and_modify_of_store_are_changes() {
        let name = store_name();
        assert!(is_store_change(
            &event(EventKind::Create(CreateKind::File), "/x/.beads/issues.jsonl"),
            &name
        ));
        assert!(is_store_change(
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                "/x/.beads/issues.jsonl"
            ),
            &name
        ));
    }

    #[test]
    fn other_files_and_kinds_are_ignored() {
        let name = store_name();
        assert!(!is_store_change(
            &event(EventKind::Create(CreateKind::File), "/x/.beads/other.jsonl"),
            &name
        ));
        assert!(!is_store_change(
            &event(EventKind::Remove(RemoveKind::File), "/x/.beads/issues.jsonl"),
            &name
        ));
        assert!(!is_store_change(
            &event(EventKind::Access(AccessKind::Any), "/x/.beads/issues.jsonl"),
            &name
        ));
    }

    #[test]
    fn full_channel_drops_extra_triggers() {
        let (tx, mut rx) = mpsc::channel(1);
        let name = store_name();
        let ev = || Ok(event(EventKind::Create(CreateKind::Any), "/x/issues.jsonl"));

        handle_notify_event(ev(), &name, &tx);
        handle_notify_event(ev(), &name, &tx);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_directory_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let result = FileWatcher::new(PathBuf::from("/nonexistent/dir/issues.jsonl"), tx);
        assert!(matches!(result, Err(WatcherError::DirectoryNotFound(_))));
    }

    #[tokio::test]
    async fn writing_the_store_emits_a_trigger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.jsonl");
        let (tx, mut rx) = mpsc::channel(4);

        let watcher = FileWatcher::new(path.clone(), tx).unwrap();
        assert_eq!(watcher.path(), path);

        fs::write(&path, "{\"id\":\"X-1\"}\n").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(got, Ok(Some(()))));
    }

    #[test]
    fn error_display() {
        let err = WatcherError::DirectoryNotFound(PathBuf::from("/test/path"));
        assert_eq!(err.to_string(), "watch directory does not exist: /test/path");
    }
}
