//! Pid file handling for `parleyd start/stop/status`.
//!
//! The pid file and the daemon log live under `<state_dir>/parley/`
//! (falling back to `/tmp/parley/`).

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use thiserror::Error;

/// Errors from pid file and process control operations.
#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("Failed to write pid file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to signal process {pid}: {source}")]
    Signal { pid: u32, source: std::io::Error },

    #[error("Process control is only supported on Unix systems")]
    Unsupported,
}

/// Directory holding the pid file and daemon log.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("parley")
}

/// Default daemon log path (stdout/stderr when daemonized).
pub fn default_log_path() -> PathBuf {
    state_dir().join("parleyd.log")
}

/// A pid file recording the running daemon's process id.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The pid file at its default location.
    pub fn default_location() -> Self {
        Self::new(state_dir().join("parleyd.pid"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the recorded pid, if the file exists and parses.
    pub fn read(&self) -> Option<u32> {
        fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }

    /// Records the current process id, creating parent directories.
    ///
    /// # Errors
    ///
    /// - `PidFileError::Write` if the directory or file cannot be written
    pub fn write_current(&self) -> Result<(), PidFileError> {
        let write_err = |source| PidFileError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, process::id().to_string()).map_err(write_err)
    }

    /// Removes the pid file. A missing file is fine.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }

    /// Returns the pid of a live daemon, removing the file if it is stale.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read()?;
        if is_process_running(pid) {
            return Some(pid);
        }
        self.remove();
        None
    }
}

/// Checks whether a process with `pid` exists.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // Signal 0 performs the existence and permission checks only.
    // SAFETY: kill(2) takes plain integers and touches no memory we own.
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    false
}

/// Sends SIGTERM to `pid`.
///
/// # Errors
///
/// - `PidFileError::Signal` if the signal cannot be delivered
/// - `PidFileError::Unsupported` on non-Unix platforms
#[cfg(unix)]
pub fn terminate(pid: u32) -> Result<(), PidFileError> {
    let target = libc::pid_t::try_from(pid).map_err(|_| PidFileError::Signal {
        pid,
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;

    // SAFETY: kill(2) only reads its two integer arguments.
    let result = unsafe { libc::kill(target, libc::SIGTERM) };
    if result != 0 {
        return Err(PidFileError::Signal {
            pid,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> Result<(), PidFileError> {
    Err(PidFileError::Unsupported)
}
