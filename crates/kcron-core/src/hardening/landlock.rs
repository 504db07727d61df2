//! Filesystem scoping with Landlock.
//!
//! Every filesystem access right the running kernel knows about is handled,
//! so anything not granted beneath the anchor is denied regardless of DAC
//! or capabilities.

use std::path::{Path, PathBuf};

use kcron_common::error::{KcronError, Result};
use kcron_common::types::LandlockEnforcement;
use landlock::{
    ABI, Access, AccessFs, BitFlags, PathBeneath, PathFd, Ruleset, RulesetAttr,
    RulesetCreatedAttr, RulesetStatus,
};

use super::FilesystemScope;

/// Highest Landlock ABI the rules are written against. Older kernels
/// negotiate down.
const TARGET_ABI: ABI = ABI::V5;

/// Outcome of installing the ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandlockStatus {
    /// Every handled right is enforced.
    FullyEnforced,
    /// The kernel supports only part of the handled rights.
    PartiallyEnforced,
    /// The kernel does not support Landlock.
    NotEnforced,
}

/// Rights granted beneath the anchor: read and write regular files, list
/// directories, create directories and regular files, unlink files.
#[must_use]
pub fn anchor_access() -> BitFlags<AccessFs> {
    AccessFs::ReadFile
        | AccessFs::WriteFile
        | AccessFs::ReadDir
        | AccessFs::MakeDir
        | AccessFs::MakeReg
        | AccessFs::RemoveFile
}

/// Rights granted when the shared root is missing and the rule lands on an
/// ancestor instead: list and create directories only. No file beneath the
/// ancestor can be opened for writing, created or unlinked.
#[must_use]
pub fn fallback_access() -> BitFlags<AccessFs> {
    AccessFs::ReadDir | AccessFs::MakeDir
}

/// Rights for a rule on `anchor` when the caller asked for `wanted`.
#[must_use]
pub fn access_for(anchor: &Path, wanted: &Path) -> BitFlags<AccessFs> {
    if anchor == wanted {
        anchor_access()
    } else {
        fallback_access()
    }
}

/// Nearest existing directory at or above `path`.
///
/// Used when the shared root has not been created yet.
#[must_use]
pub fn existing_anchor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|candidate| candidate.is_dir())
        .map(Path::to_path_buf)
}

/// Restricts the calling thread, and any thread it spawns later, to `scope`.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] if the ruleset cannot be built or
/// installed, if no existing anchor can be found, or if the kernel does not
/// enforce it and `enforcement` is [`LandlockEnforcement::Required`].
pub fn restrict(scope: &FilesystemScope, enforcement: LandlockEnforcement) -> Result<LandlockStatus> {
    let mut ruleset = Ruleset::default()
        .handle_access(AccessFs::from_all(TARGET_ABI))
        .map_err(|e| KcronError::sandbox("landlock ruleset", e))?
        .create()
        .map_err(|e| KcronError::sandbox("landlock ruleset", e))?;

    if let FilesystemScope::Subtree(wanted) = scope {
        let anchor = existing_anchor(wanted).ok_or_else(|| {
            KcronError::sandbox("landlock anchor", format!("no existing ancestor of {}", wanted.display()))
        })?;
        if anchor != *wanted {
            tracing::warn!(
                wanted = %wanted.display(),
                anchor = %anchor.display(),
                "shared root missing, scoping to nearest existing ancestor without file access"
            );
        }
        let access = access_for(&anchor, wanted);
        let fd = PathFd::new(&anchor).map_err(|e| KcronError::sandbox("landlock anchor", e))?;
        ruleset = ruleset
            .add_rule(PathBeneath::new(fd, access))
            .map_err(|e| KcronError::sandbox("landlock rule", e))?;
        tracing::debug!(anchor = %anchor.display(), "landlock rule added");
    }

    let restriction = ruleset
        .restrict_self()
        .map_err(|e| KcronError::sandbox("landlock restrict", e))?;

    let status = match restriction.ruleset {
        RulesetStatus::FullyEnforced => LandlockStatus::FullyEnforced,
        RulesetStatus::PartiallyEnforced => LandlockStatus::PartiallyEnforced,
        RulesetStatus::NotEnforced => LandlockStatus::NotEnforced,
    };

    match (status, enforcement) {
        (LandlockStatus::NotEnforced, LandlockEnforcement::Required) => Err(KcronError::sandbox(
            "landlock restrict",
            "kernel does not enforce Landlock",
        )),
        (LandlockStatus::NotEnforced, LandlockEnforcement::BestEffort) => {
            tracing::warn!("landlock unsupported by this kernel, continuing without it");
            Ok(status)
        }
        (LandlockStatus::PartiallyEnforced, _) => {
            tracing::debug!("landlock partially enforced");
            Ok(status)
        }
        (LandlockStatus::FullyEnforced, _) => Ok(status),
    }
}
