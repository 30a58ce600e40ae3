//! Crate-level error type.
//!
//! Each module defines its own error enum; [`NotifierError`] gathers them for
//! callers that just want to propagate with `?`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::secrets::{PermissionError, SecretsError};
use crate::snapshot::SnapshotError;
use crate::store::ReadError;
use crate::transport::DeliveryError;
use crate::watcher::WatcherError;

/// Errors that can occur during notifier operations.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The issue store could not be read.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The state file could not be written.
    #[error("state file error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The secrets file could not be created or read.
    #[error("secrets error: {0}")]
    Secrets(#[from] SecretsError),

    /// File permissions could not be inspected or changed.
    #[error("permission error: {0}")]
    Permission(#[from] PermissionError),

    /// A notification could not be delivered.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// The file watcher could not be started.
    #[error("file watch error: {0}")]
    Watcher(#[from] WatcherError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for notifier operations.
pub type Result<T> = std::result::Result<T, NotifierError>;
