//! Process hardening and sandboxing.
//!
//! Hardening happens in two stages, each returning a token that the next
//! stage consumes:
//!
//! 1. [`harden_process`] runs first thing in `main`: non-dumpable, no new
//!    privileges, empty environment, resource ceilings, and capabilities at
//!    rest (effective set empty, permitted set narrowed
//!    to what provisioning needs).
//! 2. [`confine`] runs once the caller's identity has been gathered and
//!    before any path is built from it: Landlock scoping, then the seccomp
//!    allow-list. Seccomp goes last because it does not allow the Landlock
//!    syscalls.

pub mod landlock;
pub mod process;
pub mod rlimit;
pub mod seccomp;

use std::path::PathBuf;

use kcron_common::config::KcronConfig;
use kcron_common::error::Result;

use crate::capability::{CapabilityState, PrivilegeBroker};
pub use self::landlock::LandlockStatus;

/// Proof that [`harden_process`] completed.
#[derive(Debug)]
#[must_use]
pub struct Hardened {
    _private: (),
}

/// Proof that [`confine`] completed.
#[derive(Debug)]
#[must_use]
pub struct Confined {
    landlock: LandlockStatus,
}

impl Confined {
    /// How the kernel applied the Landlock ruleset.
    #[must_use]
    pub const fn landlock(&self) -> LandlockStatus {
        self.landlock
    }
}

/// Filesystem reach left to the process after [`confine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesystemScope {
    /// Read, create and unlink beneath this directory only.
    Subtree(PathBuf),
    /// No filesystem access at all.
    Nothing,
}

impl FilesystemScope {
    /// Scope for commands that provision or remove keytabs.
    #[must_use]
    pub fn for_provisioning(config: &KcronConfig) -> Self {
        Self::Subtree(config.shared_root.clone())
    }
}

/// Applies the process-wide protections.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`](kcron_common::error::KcronError::SandboxSetup)
/// for the first step that fails, or
/// [`KcronError::Privilege`](kcron_common::error::KcronError::Privilege)
/// if capabilities cannot be put at rest.
pub fn harden_process<S: CapabilityState>(
    config: &KcronConfig,
    broker: &PrivilegeBroker<S>,
) -> Result<Hardened> {
    process::disable_dumping()?;
    process::forbid_new_privileges()?;
    process::clear_environment()?;
    rlimit::apply(&config.limits)?;
    broker.rest()?;
    tracing::debug!("process hardened");
    Ok(Hardened { _private: () })
}

/// Installs the filesystem sandbox and then the syscall allow-list.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`](kcron_common::error::KcronError::SandboxSetup)
/// if either layer cannot be installed, or if Landlock is unsupported and
/// the configuration requires it.
pub fn confine(_hardened: Hardened, config: &KcronConfig, scope: &FilesystemScope) -> Result<Confined> {
    let landlock = landlock::restrict(scope, config.landlock)?;
    seccomp::install_allow_list()?;
    tracing::debug!(?landlock, ?scope, "process confined");
    Ok(Confined { landlock })
}
