//! Race-safe directory provisioning.
//!
//! A path string is consulted exactly once per directory, to learn whether
//! it exists. After that the directory is reached only through a
//! [`DirHandle`]: creation happens relative to the pinned parent, and the
//! owner/mode fix-up happens through the new directory's own descriptor.

use std::io;
use std::path::Path;

use kcron_common::config::KcronConfig;
use kcron_common::error::{KcronError, Result};
use kcron_common::types::NodeSpec;

use super::handle::{DirHandle, ownership};
use crate::capability::{CapabilityState, PrivilegeBroker, PrivilegeSet};

/// Ensures directory chains exist with a fixed owner, group and mode.
#[derive(Debug)]
pub struct DirectoryProvisioner<'a, S: CapabilityState> {
    broker: &'a PrivilegeBroker<S>,
    config: &'a KcronConfig,
}

impl<'a, S: CapabilityState> DirectoryProvisioner<'a, S> {
    /// Creates a provisioner using `broker` for privileged steps and
    /// `config` for the specs of missing ancestors.
    pub const fn new(broker: &'a PrivilegeBroker<S>, config: &'a KcronConfig) -> Self {
        Self { broker, config }
    }

    /// Ensures `path` is a directory and returns a handle pinned to it.
    ///
    /// An existing directory is returned untouched: it is never re-owned or
    /// re-moded. A missing directory has its ancestors ensured first (with
    /// [`KcronConfig::ancestor_spec`], not `spec`), is created relative to
    /// the parent handle, and then gets `spec` applied through its own
    /// descriptor. Partially created ancestors are left in place on failure.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::NotADirectory`] if `path` (or an ancestor that
    /// must be created through) exists but is not a directory, including
    /// when it is a symlink, and [`KcronError::Provisioning`] or
    /// [`KcronError::Privilege`] if any step fails.
    pub fn ensure_directory(&self, path: &Path, spec: NodeSpec) -> Result<DirHandle> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_dir() => {
                tracing::trace!(path = %path.display(), "directory already present");
                return DirHandle::open(path);
            }
            Ok(_) => {
                return Err(KcronError::NotADirectory {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(KcronError::provisioning("stat", path, e)),
        }

        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(KcronError::provisioning(
                "mkdir",
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"),
            ));
        };

        let parent_dir = self.ensure_directory(parent, self.config.ancestor_spec(parent))?;

        let created = self
            .broker
            .with_privilege(PrivilegeSet::CREATE_DIRECTORY, || {
                match parent_dir.make_dir(name, spec.mode) {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                    Err(e) => Err(KcronError::provisioning("mkdir", path, e)),
                }
            })?;

        let dir = parent_dir.open_dir(name)?;
        if !created {
            // Lost a race with a concurrent invocation; it owns the fix-up.
            tracing::debug!(path = %path.display(), "directory appeared concurrently");
            return Ok(dir);
        }

        self.apply_spec(&dir, spec)?;
        tracing::info!(path = %path.display(), spec = %spec, "directory created");
        Ok(dir)
    }

    fn apply_spec(&self, dir: &DirHandle, spec: NodeSpec) -> Result<()> {
        let (owner, group, _) = ownership(&dir.metadata()?);
        if (owner, group) != (spec.owner, spec.group) {
            self.broker.with_privilege(PrivilegeSet::CHANGE_OWNER, || {
                dir.set_owner(spec.owner, spec.group)
                    .map_err(|e| KcronError::provisioning("fchown", dir.path(), e))
            })?;
        }

        // mkdir applied the umask; set the exact bits by descriptor.
        self.broker.with_privilege(PrivilegeSet::CHANGE_MODE, || {
            dir.set_mode(spec.mode)
                .map_err(|e| KcronError::provisioning("fchmod", dir.path(), e))
        })?;

        let (_, _, mode) = ownership(&dir.metadata()?);
        if mode != spec.mode {
            return Err(KcronError::provisioning(
                "fchmod",
                dir.path(),
                io::Error::other(format!("mode is {mode:04o}, wanted {:04o}", spec.mode)),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;

    use nix::unistd::{getgid, getuid};

    use super::*;
    use crate::capability::testing::RecordingCapabilities;

    fn scratch_config(root: &Path) -> KcronConfig {
        let (uid, gid) = (getuid().as_raw(), getgid().as_raw());
        KcronConfig {
            shared_root: root.join("kcron"),
            shared_root_spec: NodeSpec::new(uid, gid, 0o1711),
            intermediate_spec: NodeSpec::new(uid, gid, 0o711),
            ..KcronConfig::default()
        }
    }

    fn user_spec(config: &KcronConfig) -> NodeSpec {
        config.user_dir_spec(getuid().as_raw(), getgid().as_raw())
    }

    fn mode_of(path: &Path) -> u32 {
        let meta = std::fs::symlink_metadata(path).unwrap();
        ownership(&meta).2
    }

    #[test]
    fn creates_chain_with_ancestor_and_leaf_specs() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());
        let provisioner = DirectoryProvisioner::new(&broker, &config);
        let leaf = config.shared_root.join("1000");

        let handle = provisioner.ensure_directory(&leaf, user_spec(&config)).unwrap();

        assert_eq!(handle.path(), leaf);
        assert_eq!(mode_of(&config.shared_root), 0o1711);
        assert_eq!(mode_of(&leaf), 0o700);
        assert!(broker.state().raised_sets().contains(&"CAP_DAC_OVERRIDE".to_string()));
        assert!(broker.state().effective.borrow().is_empty());
    }

    #[test]
    fn intermediate_ancestors_get_traversable_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = scratch_config(tmp.path());
        config.shared_root = tmp.path().join("a").join("kcron");
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());
        let provisioner = DirectoryProvisioner::new(&broker, &config);

        let leaf = config.shared_root.join("7");
        drop(provisioner.ensure_directory(&leaf, user_spec(&config)).unwrap());

        assert_eq!(mode_of(&tmp.path().join("a")), 0o711);
        assert_eq!(mode_of(&config.shared_root), 0o1711);
        assert_eq!(mode_of(&leaf), 0o700);
    }

    #[test]
    fn existing_directory_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let leaf = config.shared_root.join("1000");
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::set_permissions(&leaf, std::os::unix::fs::PermissionsExt::from_mode(0o755))
            .unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        drop(
            DirectoryProvisioner::new(&broker, &config)
                .ensure_directory(&leaf, user_spec(&config))
                .unwrap(),
        );

        assert_eq!(mode_of(&leaf), 0o755);
        assert!(broker.state().raised_sets().is_empty());
    }

    #[test]
    fn symlinked_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        std::fs::create_dir_all(&config.shared_root).unwrap();
        let decoy = tmp.path().join("decoy");
        std::fs::create_dir(&decoy).unwrap();
        let before = mode_of(&decoy);
        let leaf = config.shared_root.join("1000");
        symlink(&decoy, &leaf).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        let err = DirectoryProvisioner::new(&broker, &config)
            .ensure_directory(&leaf, user_spec(&config))
            .unwrap_err();

        assert!(matches!(err, KcronError::NotADirectory { path } if path == leaf));
        assert_eq!(mode_of(&decoy), before);
    }

    #[test]
    fn file_in_place_of_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        std::fs::create_dir_all(&config.shared_root).unwrap();
        let leaf = config.shared_root.join("1000");
        std::fs::write(&leaf, b"").unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        let err = DirectoryProvisioner::new(&broker, &config)
            .ensure_directory(&leaf, user_spec(&config))
            .unwrap_err();

        assert!(matches!(err, KcronError::NotADirectory { .. }));
    }

    #[test]
    fn file_in_place_of_ancestor_aborts_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        std::fs::write(&config.shared_root, b"").unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::provisioning());

        let err = DirectoryProvisioner::new(&broker, &config)
            .ensure_directory(&config.shared_root.join("1000"), user_spec(&config))
            .unwrap_err();

        assert!(matches!(err, KcronError::NotADirectory { path } if path == config.shared_root));
    }

    #[test]
    fn privilege_failure_aborts_before_mkdir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        std::fs::create_dir_all(&config.shared_root).unwrap();
        let broker = PrivilegeBroker::new(RecordingCapabilities::default());
        let leaf: PathBuf = config.shared_root.join("1000");

        let err = DirectoryProvisioner::new(&broker, &config)
            .ensure_directory(&leaf, user_spec(&config))
            .unwrap_err();

        assert!(matches!(err, KcronError::Privilege { .. }));
        assert!(!leaf.exists());
    }
}
