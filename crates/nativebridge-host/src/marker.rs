//! Pid marker file used to keep a single bridge instance per user.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::error::{HostError, Result};

/// File name used under the temp dir when no marker path is configured.
pub const DEFAULT_MARKER_NAME: &str = "nativebridge.pid";

/// What the marker currently says about a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MarkerStatus {
    Absent,
    Live { pid: u32 },
    Stale { pid: u32 },
    /// Present but not a decimal pid.
    Invalid,
}

impl MarkerStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, MarkerStatus::Live { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            MarkerStatus::Live { pid } | MarkerStatus::Stale { pid } => Some(*pid),
            MarkerStatus::Absent | MarkerStatus::Invalid => None,
        }
    }
}

/// A marker location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMarker {
    path: PathBuf,
}

impl ProcessMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_MARKER_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and probe the marker without changing it.
    pub fn status(&self) -> Result<MarkerStatus> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(MarkerStatus::Absent),
            Err(err) => return Err(HostError::marker(&self.path, err)),
        };
        Ok(match parse_pid(&contents) {
            Some(pid) if process_alive(pid) => MarkerStatus::Live { pid },
            Some(pid) => MarkerStatus::Stale { pid },
            None => MarkerStatus::Invalid,
        })
    }

    /// Claim the marker for this process.
    ///
    /// Fails with [`HostError::DuplicateInstance`] without touching the file
    /// when it names another live process. Stale or unreadable markers are
    /// replaced. The new marker appears atomically with its full contents.
    pub fn acquire(&self) -> Result<MarkerGuard> {
        let own = std::process::id();
        match self.status()? {
            MarkerStatus::Absent => {}
            MarkerStatus::Live { pid } if pid != own => {
                return Err(HostError::DuplicateInstance {
                    pid,
                    path: self.path.clone(),
                });
            }
            status => {
                tracing::warn!(path = %self.path.display(), ?status, "replacing stale marker");
                remove_if_present(&self.path).map_err(|err| HostError::marker(&self.path, err))?;
            }
        }

        match create_atomically(&self.path, own) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                // Another instance claimed it between our probe and link.
                if let MarkerStatus::Live { pid } = self.status()? {
                    return Err(HostError::DuplicateInstance {
                        pid,
                        path: self.path.clone(),
                    });
                }
                return Err(HostError::marker(&self.path, err));
            }
            Err(err) => return Err(HostError::marker(&self.path, err)),
        }

        tracing::debug!(path = %self.path.display(), pid = own, "marker acquired");
        Ok(MarkerGuard {
            path: self.path.clone(),
            pid: own,
            released: AtomicBool::new(false),
        })
    }
}

/// Ownership of an acquired marker. Removes it on release or drop.
#[derive(Debug)]
pub struct MarkerGuard {
    path: PathBuf,
    pid: u32,
    released: AtomicBool,
}

impl MarkerGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the marker if it still names this process.
    ///
    /// Only the first call does anything. Returns whether a file was removed.
    pub fn release(&self) -> Result<bool> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "marker already gone at release");
                return Ok(false);
            }
            Err(err) => return Err(HostError::marker(&self.path, err)),
        };
        if parse_pid(&contents) != Some(self.pid) {
            tracing::warn!(path = %self.path.display(), "marker no longer ours; leaving it");
            return Ok(false);
        }

        remove_if_present(&self.path).map_err(|err| HostError::marker(&self.path, err))?;
        tracing::debug!(path = %self.path.display(), "marker removed");
        Ok(true)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for MarkerGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::error!(error = %err, "failed to remove marker on drop");
        }
    }
}

fn parse_pid(contents: &str) -> Option<u32> {
    contents.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Write the pid to a private temp file, then hard-link it into place.
/// `hard_link` fails with `AlreadyExists` rather than overwriting.
fn create_atomically(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(format!(".{pid}.tmp"));
    let staging = PathBuf::from(staging);

    fs::write(&staging, format!("{pid}\n"))?;
    let linked = fs::hard_link(&staging, path);
    let _ = fs::remove_file(&staging);
    linked
}

/// Non-destructive liveness probe.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // SAFETY: signal 0 delivers nothing; the kernel only checks existence
    // and permission for `raw`, which is a positive pid.
    let rc = unsafe { libc::kill(raw, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Non-destructive liveness probe.
///
/// A process that exists but denies query access still counts as live.
#[cfg(windows)]
pub fn process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{
        CloseHandle, GetLastError, ERROR_ACCESS_DENIED, STILL_ACTIVE,
    };
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    if pid == 0 {
        return false;
    }
    // SAFETY: OpenProcess takes plain values and returns null on failure;
    // GetLastError reads this thread's last-error slot.
    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
    if handle.is_null() {
        return unsafe { GetLastError() } == ERROR_ACCESS_DENIED;
    }

    let mut exit_code: u32 = 0;
    // SAFETY: `handle` is a valid process handle owned here and closed
    // exactly once below; `exit_code` outlives the call.
    let queried = unsafe { GetExitCodeProcess(handle, &mut exit_code) } != 0;
    unsafe { CloseHandle(handle) };
    // An exited process keeps its handle open until all handles close.
    !queried || exit_code == STILL_ACTIVE as u32
}

/// Non-destructive liveness probe.
///
/// Without a platform probe every recorded pid is reported stale.
#[cfg(not(any(unix, windows)))]
pub fn process_alive(_pid: u32) -> bool {
    false
}
