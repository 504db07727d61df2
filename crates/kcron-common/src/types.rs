//! Domain primitive types used across the kcron workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CRON_INFIX, FILE_PATH_MAX_LENGTH, HOSTNAME_MAX_LENGTH, KEYTAB_EXTENSION, USERNAME_MAX_LENGTH,
};
use crate::error::{KcronError, Result};

/// Intended owner, group and permission bits of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Owning uid.
    pub owner: u32,
    /// Owning gid.
    pub group: u32,
    /// Permission bits, including the sticky bit where relevant.
    pub mode: u32,
}

impl NodeSpec {
    /// Creates a spec from its parts.
    #[must_use]
    pub const fn new(owner: u32, group: u32, mode: u32) -> Self {
        Self { owner, group, mode }
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {:04o}", self.owner, self.group, self.mode)
    }
}

/// A soft/hard pair for one `setrlimit(2)` resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Soft limit.
    pub soft: u64,
    /// Hard limit.
    pub hard: u64,
}

impl Limit {
    /// Creates a limit pair.
    #[must_use]
    pub const fn new(soft: u64, hard: u64) -> Self {
        Self { soft, hard }
    }
}

/// Resource ceilings applied once at process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCeilings {
    /// `RLIMIT_NPROC`; zero disables forking.
    pub processes: Limit,
    /// `RLIMIT_FSIZE` in bytes.
    ///
    /// Also caps stdout and stderr when they are redirected to a regular
    /// file: appending to a log already past the soft limit fails with
    /// `EFBIG` after the keytab has been provisioned.
    pub file_size: Limit,
    /// `RLIMIT_MEMLOCK` in bytes.
    pub locked_memory: Limit,
    /// `RLIMIT_DATA` in bytes.
    pub data_segment: Limit,
    /// `RLIMIT_MSGQUEUE` in bytes.
    pub message_queue: Limit,
    /// `RLIMIT_STACK` in bytes.
    pub stack: Limit,
    /// `RLIMIT_NOFILE`.
    pub open_files: Limit,
    /// `RLIMIT_CPU` in seconds.
    pub cpu_seconds: Limit,
}

impl Default for ResourceCeilings {
    fn default() -> Self {
        Self {
            processes: Limit::new(0, 0),
            file_size: Limit::new(1024, 2048),
            locked_memory: Limit::new(0, 0),
            data_segment: Limit::new(64 << 20, 64 << 20),
            message_queue: Limit::new(0, 0),
            stack: Limit::new(1 << 20, 2 << 20),
            open_files: Limit::new(16, 16),
            cpu_seconds: Limit::new(8, 16),
        }
    }
}

/// What to do with a keytab that already exists when provisioning runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExistingKeytabPolicy {
    /// Leave content, owner and mode exactly as found.
    #[default]
    LeaveUntouched,
    /// Reset owner and mode through the descriptor; content is never touched.
    Normalize,
}

/// How strictly the filesystem-scope sandbox must be enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LandlockEnforcement {
    /// Continue with a warning when the kernel lacks Landlock.
    #[default]
    BestEffort,
    /// Fail when the ruleset is not fully enforced.
    Required,
}

/// Resolved location of one user's keytab.
///
/// Layout: `<shared_root>/<uid>/<username>.cron.<hostname>.keytab`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeytabPath {
    dir: PathBuf,
    file_name: String,
}

impl KeytabPath {
    /// Builds the keytab location for `uid`, `username` and `hostname`.
    ///
    /// Only the final `/`-separated segment of `username` and `hostname` is
    /// used.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Resolution`] if either name is empty, is `.` or
    /// `..`, contains a NUL byte, or the resulting path is too long.
    pub fn resolve(shared_root: &Path, uid: u32, username: &str, hostname: &str) -> Result<Self> {
        let username = path_component("username", username, USERNAME_MAX_LENGTH)?;
        let hostname = path_component("hostname", hostname, HOSTNAME_MAX_LENGTH)?;

        let dir = shared_root.join(uid.to_string());
        let file_name = format!("{username}{CRON_INFIX}{hostname}{KEYTAB_EXTENSION}");

        let resolved = Self { dir, file_name };
        if resolved.full_path().as_os_str().len() > FILE_PATH_MAX_LENGTH {
            return Err(KcronError::Resolution {
                what: "keytab path",
                message: format!("longer than {FILE_PATH_MAX_LENGTH} bytes"),
            });
        }
        Ok(resolved)
    }

    /// Per-uid directory holding the keytab.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of the keytab inside [`Self::dir`].
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Absolute path of the keytab.
    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

impl fmt::Display for KeytabPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_path().display())
    }
}

/// Reduces `raw` to its basename and rejects values unusable as a path
/// component.
fn path_component(what: &'static str, raw: &str, max: usize) -> Result<String> {
    let base = raw.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let reject = |message: &str| KcronError::Resolution {
        what,
        message: format!("{message}: {raw:?}"),
    };

    if base.is_empty() || base == "." || base == ".." {
        return Err(reject("unusable name"));
    }
    if base.contains('\0') {
        return Err(reject("embedded NUL byte"));
    }
    if base.len() > max {
        return Err(reject("name too long"));
    }
    Ok(base.to_owned())
}
