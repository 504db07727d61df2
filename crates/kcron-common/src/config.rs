//! Compiled-in policy for a kcron invocation.
//!
//! There is no configuration file: [`KcronConfig::default`] is the policy.
//! The struct exists so that the provisioning engine can be driven against
//! a scratch directory in tests and so that `kcron policy` can report what
//! was compiled in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    INTERMEDIATE_DIR_MODE, KEYTAB_DIR, KEYTAB_MODE, ROOT_ID, SHARED_ROOT_MODE, USER_DIR_MODE,
};
use crate::error::{KcronError, Result};
use crate::types::{ExistingKeytabPolicy, LandlockEnforcement, NodeSpec, ResourceCeilings};

/// Root configuration for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KcronConfig {
    /// Shared directory holding one subdirectory per uid.
    pub shared_root: PathBuf,
    /// Owner, group and mode given to the shared root if it must be created.
    pub shared_root_spec: NodeSpec,
    /// Owner, group and mode given to missing ancestors of the shared root.
    pub intermediate_spec: NodeSpec,
    /// Mode of the per-uid directory; owner is always the invoking user.
    pub user_dir_mode: u32,
    /// Mode of the keytab; owner is always the invoking user.
    pub keytab_mode: u32,
    /// What to do with a keytab that already exists.
    pub existing_keytab: ExistingKeytabPolicy,
    /// Resource ceilings applied at process start.
    pub limits: ResourceCeilings,
    /// Enforcement level of the filesystem-scope sandbox.
    pub landlock: LandlockEnforcement,
}

impl Default for KcronConfig {
    fn default() -> Self {
        Self {
            shared_root: PathBuf::from(KEYTAB_DIR),
            shared_root_spec: NodeSpec::new(ROOT_ID, ROOT_ID, SHARED_ROOT_MODE),
            intermediate_spec: NodeSpec::new(ROOT_ID, ROOT_ID, INTERMEDIATE_DIR_MODE),
            user_dir_mode: USER_DIR_MODE,
            keytab_mode: KEYTAB_MODE,
            existing_keytab: ExistingKeytabPolicy::default(),
            limits: ResourceCeilings::default(),
            landlock: LandlockEnforcement::default(),
        }
    }
}

impl KcronConfig {
    /// Spec for a directory created on the way to a per-uid directory.
    ///
    /// The shared root gets the sticky spec; anything above it gets the
    /// plain traversable spec.
    #[must_use]
    pub fn ancestor_spec(&self, path: &Path) -> NodeSpec {
        if path == self.shared_root {
            self.shared_root_spec
        } else {
            self.intermediate_spec
        }
    }

    /// Spec of the per-uid directory for the given real ids.
    #[must_use]
    pub const fn user_dir_spec(&self, uid: u32, gid: u32) -> NodeSpec {
        NodeSpec::new(uid, gid, self.user_dir_mode)
    }

    /// Spec of the keytab for the given real ids.
    #[must_use]
    pub const fn keytab_spec(&self, uid: u32, gid: u32) -> NodeSpec {
        NodeSpec::new(uid, gid, self.keytab_mode)
    }

    /// Checks that the policy cannot produce loose permissions.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Config`] for a relative shared root, a per-uid
    /// directory or keytab mode granting group/other write access, a keytab
    /// mode granting any group/other access, or an ancestor mode that is
    /// writable by group/other.
    pub fn validate(&self) -> Result<()> {
        if !self.shared_root.is_absolute() {
            return Err(KcronError::Config {
                message: format!("shared root {} is not absolute", self.shared_root.display()),
            });
        }
        if self.keytab_mode & 0o077 != 0 || self.keytab_mode & 0o7000 != 0 {
            return Err(KcronError::Config {
                message: format!("keytab mode {:04o} is not owner-only", self.keytab_mode),
            });
        }
        for (what, mode) in [
            ("per-uid directory", self.user_dir_mode),
            ("shared root", self.shared_root_spec.mode),
            ("intermediate directory", self.intermediate_spec.mode),
        ] {
            if mode & 0o022 != 0 {
                return Err(KcronError::Config {
                    message: format!("{what} mode {mode:04o} is group/other writable"),
                });
            }
        }
        Ok(())
    }
}
