//! Resource ceilings.
//!
//! Limits are only ever lowered: a ceiling above the inherited hard limit is
//! clamped to it instead of failing.

use kcron_common::error::{KcronError, Result};
use kcron_common::types::{Limit, ResourceCeilings};
use nix::sys::resource::{Resource, getrlimit, setrlimit};

/// One resource and the ceiling it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ceiling {
    /// Kernel resource.
    pub resource: Resource,
    /// Name used in diagnostics.
    pub name: &'static str,
    /// Requested soft/hard pair.
    pub limit: Limit,
}

/// Table of every ceiling derived from `limits`.
#[must_use]
pub fn ceilings(limits: &ResourceCeilings) -> [Ceiling; 8] {
    let c = |resource, name, limit| Ceiling {
        resource,
        name,
        limit,
    };
    [
        c(Resource::RLIMIT_NPROC, "RLIMIT_NPROC", limits.processes),
        c(Resource::RLIMIT_FSIZE, "RLIMIT_FSIZE", limits.file_size),
        c(Resource::RLIMIT_MEMLOCK, "RLIMIT_MEMLOCK", limits.locked_memory),
        c(Resource::RLIMIT_DATA, "RLIMIT_DATA", limits.data_segment),
        c(Resource::RLIMIT_MSGQUEUE, "RLIMIT_MSGQUEUE", limits.message_queue),
        c(Resource::RLIMIT_STACK, "RLIMIT_STACK", limits.stack),
        c(Resource::RLIMIT_NOFILE, "RLIMIT_NOFILE", limits.open_files),
        c(Resource::RLIMIT_CPU, "RLIMIT_CPU", limits.cpu_seconds),
    ]
}

/// Soft/hard pair to install given the currently inherited hard limit.
#[must_use]
pub fn clamp(limit: Limit, current_hard: u64) -> Limit {
    let hard = limit.hard.min(current_hard);
    Limit::new(limit.soft.min(hard), hard)
}

/// Applies every ceiling in `limits`.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] naming the first resource whose
/// `getrlimit` or `setrlimit` fails.
pub fn apply(limits: &ResourceCeilings) -> Result<()> {
    for ceiling in ceilings(limits) {
        let (_, current_hard) =
            getrlimit(ceiling.resource).map_err(|e| KcronError::sandbox(ceiling.name, e))?;
        let effective = clamp(ceiling.limit, current_hard);
        setrlimit(ceiling.resource, effective.soft, effective.hard)
            .map_err(|e| KcronError::sandbox(ceiling.name, e))?;
        tracing::trace!(
            resource = ceiling.name,
            soft = effective.soft,
            hard = effective.hard,
            "resource ceiling set"
        );
    }
    tracing::debug!("resource ceilings applied");
    Ok(())
}
