//! Keytab removal.

use std::ffi::OsStr;
use std::io;
use std::path::PathBuf;

use kcron_common::error::{KcronError, Result};
use kcron_common::types::KeytabPath;

use super::handle::{DirHandle, EntryKind};
use crate::capability::{CapabilityState, PrivilegeBroker, PrivilegeSet};

/// What [`remove_keytab`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The keytab existed and was unlinked.
    Removed(PathBuf),
    /// There was nothing to remove.
    Absent,
}

/// Unlinks the keytab at `keytab`, if there is one.
///
/// A missing per-uid directory or keytab is not an error. Only the keytab
/// entry itself is removed; the per-uid directory is kept. The unlink runs
/// relative to a handle on the per-uid directory.
///
/// # Errors
///
/// Returns [`KcronError::NotADirectory`] if the per-uid directory is a
/// symlink or not a directory, [`KcronError::NotARegularFile`] if the keytab
/// entry is anything but a regular file, and [`KcronError::Provisioning`] or
/// [`KcronError::Privilege`] if the unlink fails.
pub fn remove_keytab<S: CapabilityState>(
    broker: &PrivilegeBroker<S>,
    keytab: &KeytabPath,
) -> Result<Removal> {
    match std::fs::symlink_metadata(keytab.dir()) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(dir = %keytab.dir().display(), "no keytab directory");
            return Ok(Removal::Absent);
        }
        Err(e) => return Err(KcronError::provisioning("stat", keytab.dir(), e)),
    }

    let dir = DirHandle::open(keytab.dir())?;
    let name = OsStr::new(keytab.file_name());
    let path = dir.child_path(name);

    match dir.entry_kind(name)? {
        None => {
            tracing::debug!(path = %path.display(), "no keytab to remove");
            return Ok(Removal::Absent);
        }
        Some(EntryKind::Regular) => {}
        Some(_) => return Err(KcronError::NotARegularFile { path }),
    }

    let removed = broker.with_privilege(PrivilegeSet::REMOVE_FILE, || {
        match dir.remove_file(name) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(KcronError::provisioning("unlink", &path, e)),
        }
    })?;

    if removed {
        tracing::info!(path = %path.display(), "keytab removed");
        Ok(Removal::Removed(path))
    } else {
        Ok(Removal::Absent)
    }
}
