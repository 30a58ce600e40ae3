//! Owner-only file handling for the webhook secret and notifier state.
//!
//! The secrets file, the config file, the state file and the PID file are all
//! kept at mode `0600`; the secrets directory at `0700`. A file found with
//! looser permissions is tightened in place with a warning. Failure to
//! tighten is reported as a [`PermissionError`] for the caller to log; it is
//! never fatal.
//!
//! On non-Unix platforms permission bits are not inspected and every file is
//! treated as already private.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

/// Mode required for secret-bearing files.
pub const REQUIRED_FILE_MODE: u32 = 0o600;

/// Mode for the secrets directory.
pub const SECRETS_DIR_MODE: u32 = 0o700;

/// Placeholder written into a freshly created secrets file.
pub const SECRET_PLACEHOLDER: &str = "# Paste your Slack webhook URL here (replace this line)";

/// Permissions on a private file could not be inspected or tightened.
#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("cannot inspect permissions of {}: {source}", .path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot set permissions on {}: {source}", .path.display())]
    Set {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from secrets-file initialization.
#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("failed to create secrets directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create secrets file {}: {source}", .path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read secrets file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of [`init_secrets_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A placeholder file was created.
    Created,

    /// The file already existed; `tightened` reports whether its
    /// permissions had to be fixed.
    AlreadyExists { tightened: bool },
}

/// Returns the permission bits of `path`.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be inspected.
pub fn file_mode(path: &Path) -> io::Result<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(std::fs::metadata(path)?.permissions().mode() & 0o777)
    }

    #[cfg(not(unix))]
    {
        std::fs::metadata(path)?;
        Ok(REQUIRED_FILE_MODE)
    }
}

/// Sets `path` to `mode` if it differs. Returns `true` if a change was made.
///
/// A missing file is not an error and returns `false`.
///
/// # Errors
///
/// Returns [`PermissionError`] if the mode cannot be read or changed.
pub fn enforce_mode(path: &Path, mode: u32) -> Result<bool, PermissionError> {
    if !path.exists() {
        return Ok(false);
    }

    let current = file_mode(path).map_err(|source| PermissionError::Inspect {
        path: path.to_path_buf(),
        source,
    })?;
    if current == mode {
        return Ok(false);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(
            |source| PermissionError::Set {
                path: path.to_path_buf(),
                source,
            },
        )?;
    }

    info!(
        path = %path.display(),
        from = %format!("{current:#o}"),
        to = %format!("{mode:#o}"),
        "Tightened file permissions"
    );
    Ok(true)
}

/// Ensures `path` is owner read/write only. See [`enforce_mode`].
///
/// # Errors
///
/// Returns [`PermissionError`] if the mode cannot be read or changed.
pub fn enforce_file_permissions(path: &Path) -> Result<bool, PermissionError> {
    enforce_mode(path, REQUIRED_FILE_MODE)
}

/// Like [`enforce_file_permissions`] but logs failures instead of returning
/// them.
pub fn harden(path: &Path) -> bool {
    match enforce_file_permissions(path) {
        Ok(changed) => changed,
        Err(e) => {
            warn!(error = %e, "Could not restrict file permissions");
            false
        }
    }
}

/// Writes `contents` to `path`, creating or truncating it, readable by the
/// owner only.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or written. Failure to
/// tighten a pre-existing file's mode is only logged.
pub fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(REQUIRED_FILE_MODE);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.flush()?;
    drop(file);

    // The open mode only applies on creation.
    harden(path);
    Ok(())
}

/// Reads the webhook URL from a secrets file.
///
/// Returns the first non-empty line that is not a `#` comment, or `None` if
/// the file is missing or holds only the placeholder. Insecure permissions
/// are tightened with a warning before the file is read.
///
/// # Errors
///
/// Returns [`SecretsError::Read`] if the file exists but cannot be read.
pub fn read_secret(path: &Path) -> Result<Option<String>, SecretsError> {
    if !path.exists() {
        return Ok(None);
    }

    if let Ok(mode) = file_mode(path) {
        if mode != REQUIRED_FILE_MODE {
            warn!(
                path = %path.display(),
                mode = %format!("{mode:#o}"),
                "Secrets file has insecure permissions, fixing"
            );
            harden(path);
        }
    }

    let contents = std::fs::read_to_string(path).map_err(|source| SecretsError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string))
}

/// Creates the secrets directory and a placeholder secrets file.
///
/// An existing file is left in place and only has its permissions checked.
///
/// # Errors
///
/// Returns [`SecretsError`] if the directory or the file cannot be created.
pub fn init_secrets_file(path: &Path) -> Result<InitOutcome, SecretsError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            create_private_dir(dir).map_err(|source| SecretsError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
            info!(path = %dir.display(), "Created secrets directory");
        }
    }

    if path.exists() {
        let tightened = harden(path);
        return Ok(InitOutcome::AlreadyExists { tightened });
    }

    write_private(path, format!("{SECRET_PLACEHOLDER}\n").as_bytes()).map_err(|source| {
        SecretsError::CreateFile {
            path: path.to_path_buf(),
            source,
        }
    })?;
    info!(path = %path.display(), "Created secrets file");
    Ok(InitOutcome::Created)
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(SECRETS_DIR_MODE);
    }

    builder.create(dir)
}
