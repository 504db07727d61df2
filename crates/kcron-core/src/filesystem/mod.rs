//! Descriptor-anchored filesystem provisioning.
//!
//! Everything below the first existing ancestor is reached through a
//! [`DirHandle`]. Path strings are used to find a starting point and for
//! messages, never to address an object that is about to be modified.

pub mod directory;
pub mod handle;
pub mod keytab;
pub mod removal;

use std::ffi::OsStr;

use kcron_common::config::KcronConfig;
use kcron_common::error::Result;
use kcron_common::types::KeytabPath;

use crate::capability::{CapabilityState, PrivilegeBroker};
use directory::DirectoryProvisioner;
use keytab::{KeytabProvisioner, Provision};

/// Ensures the shared root exists with [`KcronConfig::shared_root_spec`].
///
/// Runs before confinement, so the Landlock rule can be anchored on the
/// shared root itself rather than on an ancestor. It takes no input from the
/// caller.
///
/// # Errors
///
/// Returns [`KcronError::NotADirectory`](kcron_common::error::KcronError::NotADirectory)
/// if something other than a directory is in the way, or the first
/// provisioning failure.
pub fn ensure_shared_root<S: CapabilityState>(
    broker: &PrivilegeBroker<S>,
    config: &KcronConfig,
) -> Result<()> {
    DirectoryProvisioner::new(broker, config)
        .ensure_directory(&config.shared_root, config.shared_root_spec)
        .map(drop)
}

/// Ensures the per-uid directory and the keytab for `uid`/`gid` exist.
///
/// Missing ancestors of the per-uid directory are created with the specs
/// from `config`. Existing objects keep their owner and mode, except that
/// an existing keytab is normalized under
/// [`ExistingKeytabPolicy::Normalize`](kcron_common::types::ExistingKeytabPolicy::Normalize).
///
/// # Errors
///
/// Propagates the first failure from directory or keytab provisioning.
/// Objects created before the failure are left in place.
pub fn provision_keytab<S: CapabilityState>(
    broker: &PrivilegeBroker<S>,
    config: &KcronConfig,
    uid: u32,
    gid: u32,
    keytab: &KeytabPath,
) -> Result<Provision> {
    let dir = DirectoryProvisioner::new(broker, config)
        .ensure_directory(keytab.dir(), config.user_dir_spec(uid, gid))?;

    KeytabProvisioner::new(broker, config.existing_keytab).ensure_keytab_file(
        &dir,
        OsStr::new(keytab.file_name()),
        config.keytab_spec(uid, gid),
    )
}
