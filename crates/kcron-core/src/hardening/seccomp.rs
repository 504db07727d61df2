//! Default-deny syscall allow-list.
//!
//! Installed last: once it is in place any syscall not listed here kills
//! the process. A few syscalls are only allowed for specific arguments, see
//! [`conditional_rules`].

use std::collections::BTreeMap;

use kcron_common::error::{KcronError, Result};
use seccompiler::{
    BpfProgram, SeccompAction, SeccompCmpArgLen, SeccompCmpOp, SeccompCondition, SeccompFilter,
    SeccompRule, TargetArch,
};

/// Descriptors `write`/`writev` may target: stdout and stderr.
pub const OUTPUT_FDS: [u64; 2] = [1, 2];

/// Syscalls the provisioning path may issue with any arguments after
/// confinement.
#[must_use]
pub fn allowed_syscalls() -> Vec<i64> {
    let mut syscalls = vec![
        // keytab marker, written at an explicit offset
        libc::SYS_pwrite64,
        // descriptor-relative filesystem work
        libc::SYS_openat,
        libc::SYS_close,
        libc::SYS_read,
        libc::SYS_fstat,
        libc::SYS_newfstatat,
        libc::SYS_statx,
        libc::SYS_mkdirat,
        libc::SYS_unlinkat,
        libc::SYS_fchown,
        libc::SYS_fchmod,
        libc::SYS_fsync,
        // capability broker
        libc::SYS_capget,
        libc::SYS_capset,
        libc::SYS_prctl,
        libc::SYS_getuid,
        libc::SYS_getgid,
        libc::SYS_geteuid,
        libc::SYS_getegid,
        libc::SYS_setresuid,
        libc::SYS_setresgid,
        // allocator and runtime
        libc::SYS_brk,
        libc::SYS_mmap,
        libc::SYS_munmap,
        libc::SYS_mremap,
        libc::SYS_mprotect,
        libc::SYS_madvise,
        libc::SYS_futex,
        libc::SYS_getrandom,
        libc::SYS_clock_gettime,
        libc::SYS_rt_sigprocmask,
        libc::SYS_rt_sigreturn,
        libc::SYS_sigaltstack,
        libc::SYS_exit,
        libc::SYS_exit_group,
    ];
    #[cfg(target_arch = "x86_64")]
    syscalls.extend([
        libc::SYS_open,
        libc::SYS_stat,
        libc::SYS_lstat,
        libc::SYS_mkdir,
        libc::SYS_chown,
        libc::SYS_chmod,
    ]);
    syscalls
}

fn arg_equals(index: u8, value: u64) -> Result<SeccompRule> {
    let condition = SeccompCondition::new(index, SeccompCmpArgLen::Dword, SeccompCmpOp::Eq, value)
        .map_err(|e| KcronError::sandbox("seccomp condition", e))?;
    SeccompRule::new(vec![condition]).map_err(|e| KcronError::sandbox("seccomp rule", e))
}

/// Syscalls allowed only when one of their rules matches.
///
/// - `write`/`writev` only to [`OUTPUT_FDS`].
/// - `fcntl` only as `F_GETFD`, which debug builds issue when an owned
///   descriptor is closed.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] if a rule cannot be built.
pub fn conditional_rules() -> Result<Vec<(i64, Vec<SeccompRule>)>> {
    let to_output = || {
        OUTPUT_FDS
            .iter()
            .map(|&fd| arg_equals(0, fd))
            .collect::<Result<Vec<_>>>()
    };
    Ok(vec![
        (libc::SYS_write, to_output()?),
        (libc::SYS_writev, to_output()?),
        (libc::SYS_fcntl, vec![arg_equals(1, u64::from(libc::F_GETFD.unsigned_abs()))?]),
    ])
}

/// Compiles the allow-list for the running architecture.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] if the architecture is unsupported
/// or the filter does not compile.
pub fn compile_allow_list() -> Result<BpfProgram> {
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = allowed_syscalls()
        .into_iter()
        .map(|syscall| (syscall, Vec::new()))
        .collect();
    rules.extend(conditional_rules()?);

    let arch: TargetArch = std::env::consts::ARCH
        .try_into()
        .map_err(|e: seccompiler::BackendError| KcronError::sandbox("seccomp arch", e))?;

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::KillProcess,
        SeccompAction::Allow,
        arch,
    )
    .map_err(|e| KcronError::sandbox("seccomp filter", e))?;

    filter
        .try_into()
        .map_err(|e: seccompiler::BackendError| KcronError::sandbox("seccomp compile", e))
}

/// Compiles and installs the allow-list on the calling thread.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] if compilation or installation
/// fails.
pub fn install_allow_list() -> Result<()> {
    let program = compile_allow_list()?;
    seccompiler::apply_filter(&program).map_err(|e| KcronError::sandbox("seccomp install", e))?;
    tracing::debug!(instructions = program.len(), "seccomp allow-list installed");
    Ok(())
}
