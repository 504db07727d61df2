//! Identity of the invoking user.
//!
//! Values here come from the caller's side of the setuid boundary and are
//! only turned into a path by [`Identity::keytab_path`].

use std::path::Path;

use kcron_common::error::{KcronError, Result};
use kcron_common::types::KeytabPath;
use nix::unistd::{User, getgid, gethostname, getuid};

/// Real uid/gid, login name and hostname of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Real uid.
    pub uid: u32,
    /// Real gid.
    pub gid: u32,
    /// Login name of the real uid.
    pub username: String,
    /// Host name as reported by the kernel.
    pub hostname: String,
}

impl Identity {
    /// Gathers the identity of the current process.
    ///
    /// The username comes from the password database entry of the real uid,
    /// never from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Resolution`] if the real uid has no password
    /// entry or the hostname cannot be read or is not valid UTF-8.
    pub fn current() -> Result<Self> {
        let uid = getuid();
        let gid = getgid();

        let user = User::from_uid(uid)
            .map_err(|e| KcronError::Resolution {
                what: "username",
                message: format!("getpwuid({uid}): {e}"),
            })?
            .ok_or_else(|| KcronError::Resolution {
                what: "username",
                message: format!("no password entry for uid {uid}"),
            })?;

        let hostname = gethostname()
            .map_err(|e| KcronError::Resolution {
                what: "hostname",
                message: e.to_string(),
            })?
            .into_string()
            .map_err(|raw| KcronError::Resolution {
                what: "hostname",
                message: format!("not valid UTF-8: {}", raw.to_string_lossy()),
            })?;

        let identity = Self {
            uid: uid.as_raw(),
            gid: gid.as_raw(),
            username: user.name,
            hostname,
        };
        tracing::debug!(
            uid = identity.uid,
            gid = identity.gid,
            username = %identity.username,
            hostname = %identity.hostname,
            "identity gathered"
        );
        Ok(identity)
    }

    /// Keytab location for this identity under `shared_root`.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Resolution`] if the username or hostname is
    /// unusable as a path component.
    pub fn keytab_path(&self, shared_root: &Path) -> Result<KeytabPath> {
        KeytabPath::resolve(shared_root, self.uid, &self.username, &self.hostname)
    }
}
