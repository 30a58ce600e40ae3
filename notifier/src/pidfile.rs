//! PID file marking a running daemon.
//!
//! The file holds the process id followed by a newline and is readable by the
//! owner only. It is removed on clean shutdown and, as a fallback, when the
//! [`PidFile`] guard is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::secrets::write_private;

/// Guard for a written PID file.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    removed: bool,
}

impl PidFile {
    /// Writes the current process id to `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let pid = std::process::id();
        write_private(&path, format!("{pid}\n").as_bytes())?;
        debug!(path = %path.display(), pid, "Wrote PID file");

        Ok(Self {
            path,
            removed: false,
        })
    }

    /// Path of the PID file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the pid stored at `path`, if any.
    #[must_use]
    pub fn read(path: &Path) -> Option<u32> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    /// Removes the file. Calling this more than once is harmless.
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed PID file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove PID file"),
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}
