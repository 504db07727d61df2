//! Keytab file provisioning anchored to a verified directory handle.
//!
//! The keytab is only ever created with `openat(O_CREAT | O_EXCL |
//! O_NOFOLLOW | O_CLOEXEC)` relative to the per-uid [`DirHandle`], with its
//! final owner-only mode applied at creation. Ownership and mode are then
//! normalized through the new descriptor.

use std::ffi::OsStr;
use std::fs::{File, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{FileExt, PermissionsExt};
use std::path::{Path, PathBuf};

use kcron_common::constants::EMPTY_KEYTAB;
use kcron_common::error::{KcronError, Result};
use kcron_common::types::{ExistingKeytabPolicy, NodeSpec};
use nix::errno::Errno;

use super::handle::{DirHandle, EntryKind, ownership};
use crate::capability::{CapabilityState, PrivilegeBroker, PrivilegeSet};

/// An open keytab produced or adjusted by [`KeytabProvisioner`].
#[derive(Debug)]
pub struct KeytabFile {
    file: File,
    path: PathBuf,
}

impl KeytabFile {
    /// Path of the keytab. Informational only.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `fstat` of the keytab through its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Provisioning`] if `fstat` fails.
    pub fn metadata(&self) -> Result<Metadata> {
        self.file
            .metadata()
            .map_err(|e| KcronError::provisioning("fstat", &self.path, e))
    }
}

/// What [`KeytabProvisioner::ensure_keytab_file`] did.
#[derive(Debug)]
pub enum Provision {
    /// The keytab was absent and has been created.
    Created(KeytabFile),
    /// The keytab existed; owner and mode were reset.
    Normalized(KeytabFile),
    /// The keytab existed and was left exactly as found.
    Untouched,
}

impl Provision {
    /// Whether this run created the keytab.
    #[must_use]
    pub const fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Creates the keytab if it is missing.
#[derive(Debug)]
pub struct KeytabProvisioner<'a, S: CapabilityState> {
    broker: &'a PrivilegeBroker<S>,
    existing: ExistingKeytabPolicy,
}

impl<'a, S: CapabilityState> KeytabProvisioner<'a, S> {
    /// Creates a provisioner with the given policy for existing keytabs.
    pub const fn new(broker: &'a PrivilegeBroker<S>, existing: ExistingKeytabPolicy) -> Self {
        Self { broker, existing }
    }

    /// Ensures the keytab `name` exists inside `dir`.
    ///
    /// An existing regular file is handled according to the
    /// [`ExistingKeytabPolicy`]; its content is never modified. A missing
    /// file is created with `spec.mode`, filled with the empty-keytab marker,
    /// flushed with `fsync`, then chowned (only if needed) and chmodded to
    /// `spec` through its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::NotARegularFile`] if anything other than a
    /// regular file (a symlink in particular) is at `name`, and
    /// [`KcronError::Provisioning`] or [`KcronError::Privilege`] if any step
    /// fails.
    pub fn ensure_keytab_file(
        &self,
        dir: &DirHandle,
        name: &OsStr,
        spec: NodeSpec,
    ) -> Result<Provision> {
        let path = dir.child_path(name);

        match dir.entry_kind(name)? {
            Some(EntryKind::Regular) => return self.existing(dir, name, path, spec),
            Some(_) => return Err(KcronError::NotARegularFile { path }),
            None => {}
        }

        let created = self.broker.with_privilege(PrivilegeSet::CREATE_FILE, || {
            match dir.create_file(name, spec.mode) {
                Ok(file) => Ok(Some(file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
                Err(e) => Err(KcronError::provisioning("openat", &path, e)),
            }
        })?;

        let Some(mut file) = created else {
            // Something appeared between the check and the create.
            return match dir.entry_kind(name)? {
                Some(EntryKind::Regular) => {
                    tracing::debug!(path = %path.display(), "keytab appeared concurrently");
                    Ok(Provision::Untouched)
                }
                _ => Err(KcronError::NotARegularFile { path }),
            };
        };

        let meta = file
            .metadata()
            .map_err(|e| KcronError::provisioning("fstat", &path, e))?;
        if !meta.is_file() {
            return Err(KcronError::NotARegularFile { path });
        }

        file.write_all_at(&EMPTY_KEYTAB, 0)
            .map_err(|e| KcronError::provisioning("write", &path, e))?;
        file.sync_all()
            .map_err(|e| KcronError::provisioning("fsync", &path, e))?;

        self.normalize(&file, &path, spec)?;
        tracing::info!(path = %path.display(), spec = %spec, "keytab created");
        Ok(Provision::Created(KeytabFile { file, path }))
    }

    fn existing(
        &self,
        dir: &DirHandle,
        name: &OsStr,
        path: PathBuf,
        spec: NodeSpec,
    ) -> Result<Provision> {
        match self.existing {
            ExistingKeytabPolicy::LeaveUntouched => {
                tracing::debug!(path = %path.display(), "keytab present, leaving untouched");
                Ok(Provision::Untouched)
            }
            ExistingKeytabPolicy::Normalize => {
                let file = self.broker.with_privilege(PrivilegeSet::OPEN_FILE, || {
                    dir.open_file(name).map_err(|e| match e.raw_os_error() {
                        Some(code) if code == Errno::ELOOP as i32 => {
                            KcronError::NotARegularFile { path: path.clone() }
                        }
                        _ => KcronError::provisioning("openat", &path, e),
                    })
                })?;
                self.normalize(&file, &path, spec)?;
                tracing::info!(path = %path.display(), spec = %spec, "keytab normalized");
                Ok(Provision::Normalized(KeytabFile { file, path }))
            }
        }
    }

    fn normalize(&self, file: &File, path: &Path, spec: NodeSpec) -> Result<()> {
        let meta = file
            .metadata()
            .map_err(|e| KcronError::provisioning("fstat", path, e))?;
        if !meta.is_file() {
            return Err(KcronError::NotARegularFile {
                path: path.to_path_buf(),
            });
        }

        let (owner, group, _) = ownership(&meta);
        if (owner, group) != (spec.owner, spec.group) {
            self.broker.with_privilege(PrivilegeSet::CHANGE_OWNER, || {
                std::os::unix::fs::fchown(file, Some(spec.owner), Some(spec.group))
                    .map_err(|e| KcronError::provisioning("fchown", path, e))
            })?;
        }

        self.broker.with_privilege(PrivilegeSet::CHANGE_MODE, || {
            file.set_permissions(Permissions::from_mode(spec.mode))
                .map_err(|e| KcronError::provisioning("fchmod", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::os::unix::fs::symlink;

    use caps::Capability;
    use nix::unistd::{getgid, getuid};

    use super::*;
    use crate::capability::testing::RecordingCapabilities;

    const NAME: &str = "alice.cron.host1.keytab";

    fn spec() -> NodeSpec {
        NodeSpec::new(getuid().as_raw(), getgid().as_raw(), 0o600)
    }

    fn mode_of(path: &Path) -> u32 {
        ownership(&std::fs::symlink_metadata(path).unwrap()).2
    }

    #[test]
    fn creates_marker_file_owner_only() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        let outcome = KeytabProvisioner::new(&broker, ExistingKeytabPolicy::LeaveUntouched)
            .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
            .unwrap();

        let Provision::Created(keytab) = outcome else {
            panic!("expected creation, got {outcome:?}");
        };
        let (owner, group, mode) = ownership(&keytab.metadata().unwrap());
        assert_eq!((owner, group, mode), (spec().owner, spec().group, 0o600));
        assert_eq!(std::fs::read(tmp.path().join(NAME)).unwrap(), [0x05, 0x02]);
        assert!(broker.state().effective.borrow().is_empty());
    }

    #[test]
    fn second_run_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());
        let provisioner = KeytabProvisioner::new(&broker, ExistingKeytabPolicy::LeaveUntouched);

        assert!(provisioner
            .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
            .unwrap()
            .created());
        let raised_after_first = broker.state().raised_sets().len();

        let again = provisioner
            .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
            .unwrap();

        assert!(matches!(again, Provision::Untouched));
        assert_eq!(broker.state().raised_sets().len(), raised_after_first);
    }

    #[test]
    fn existing_content_and_mode_survive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(NAME);
        std::fs::write(&path, b"live credentials").unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        let outcome = KeytabProvisioner::new(&broker, ExistingKeytabPolicy::LeaveUntouched)
            .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
            .unwrap();

        assert!(matches!(outcome, Provision::Untouched));
        assert_eq!(std::fs::read(&path).unwrap(), b"live credentials");
        assert_eq!(mode_of(&path), 0o644);
    }

    #[test]
    fn normalize_policy_resets_mode_but_not_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(NAME);
        std::fs::write(&path, b"live credentials").unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        let outcome = KeytabProvisioner::new(&broker, ExistingKeytabPolicy::Normalize)
            .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
            .unwrap();

        assert!(matches!(outcome, Provision::Normalized(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"live credentials");
        assert_eq!(mode_of(&path), 0o600);
    }

    #[test]
    fn planted_symlink_fails_and_target_is_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let sensitive = tmp.path().join("passwd");
        std::fs::write(&sensitive, b"root:x:0:0:root:/root:/bin/sh\n").unwrap();
        std::fs::set_permissions(&sensitive, Permissions::from_mode(0o644)).unwrap();
        let keytab_dir = tmp.path().join("1000");
        std::fs::create_dir(&keytab_dir).unwrap();
        symlink(&sensitive, keytab_dir.join(NAME)).unwrap();
        let dir = DirHandle::open(&keytab_dir).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        for policy in [ExistingKeytabPolicy::LeaveUntouched, ExistingKeytabPolicy::Normalize] {
            let err = KeytabProvisioner::new(&broker, policy)
                .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
                .unwrap_err();
            assert!(matches!(err, KcronError::NotARegularFile { .. }));
        }

        assert_eq!(
            std::fs::read(&sensitive).unwrap(),
            b"root:x:0:0:root:/root:/bin/sh\n"
        );
        assert_eq!(mode_of(&sensitive), 0o644);
    }

    #[test]
    fn directory_at_keytab_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(NAME)).unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        let err = KeytabProvisioner::new(&broker, ExistingKeytabPolicy::LeaveUntouched)
            .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
            .unwrap_err();

        assert!(matches!(err, KcronError::NotARegularFile { .. }));
    }

    #[test]
    fn aborting_before_chmod_never_leaves_group_or_world_access() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let state = RecordingCapabilities {
            permitted: RefCell::new(
                [Capability::CAP_DAC_OVERRIDE, Capability::CAP_CHOWN]
                    .into_iter()
                    .collect(),
            ),
            ..RecordingCapabilities::default()
        };
        let broker = PrivilegeBroker::new(state);

        let err = KeytabProvisioner::new(&broker, ExistingKeytabPolicy::LeaveUntouched)
            .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
            .unwrap_err();

        assert!(matches!(err, KcronError::Privilege { .. }));
        let path = tmp.path().join(NAME);
        assert_eq!(mode_of(&path) & 0o077, 0);
        assert_eq!(std::fs::read(&path).unwrap(), [0x05, 0x02]);
    }

    #[test]
    fn create_privilege_covers_only_the_open() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        drop(
            KeytabProvisioner::new(&broker, ExistingKeytabPolicy::LeaveUntouched)
                .ensure_keytab_file(&dir, OsStr::new(NAME), spec())
                .unwrap(),
        );

        // Owner already matches in a scratch directory, so no CAP_CHOWN.
        assert_eq!(
            broker.state().raised_sets(),
            vec!["CAP_DAC_OVERRIDE".to_string(), "CAP_FOWNER".to_string()]
        );
    }
}
