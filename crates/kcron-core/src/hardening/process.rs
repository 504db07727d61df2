//! Process-wide protections applied before anything else runs.
//!
//! Everything here has to succeed when the binary is started setuid-root or
//! with file capabilities by an unprivileged user, under an ordinary shell
//! with no tracer attached. A non-dumpable process already refuses
//! `PTRACE_ATTACH` from callers lacking `CAP_SYS_PTRACE`.

use kcron_common::error::{KcronError, Result};
use nix::sys::prctl;

/// Marks the process non-dumpable: no core files, and `/proc/<pid>` stays
/// owned by root.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] if `prctl(PR_SET_DUMPABLE)` fails.
pub fn disable_dumping() -> Result<()> {
    prctl::set_dumpable(false).map_err(|e| KcronError::sandbox("PR_SET_DUMPABLE", e))?;
    tracing::debug!("core dumps disabled");
    Ok(())
}

/// Sets `PR_SET_NO_NEW_PRIVS`, required before unprivileged Landlock and
/// seccomp, and stops any later `execve` from gaining privilege.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] if `prctl` fails.
pub fn forbid_new_privileges() -> Result<()> {
    prctl::set_no_new_privs().map_err(|e| KcronError::sandbox("PR_SET_NO_NEW_PRIVS", e))
}

/// Drops every inherited environment variable.
///
/// # Errors
///
/// Returns [`KcronError::SandboxSetup`] if `clearenv` fails.
#[allow(unsafe_code)]
pub fn clear_environment() -> Result<()> {
    // SAFETY: called from `harden_process` at the top of `main`, before any
    // thread is spawned, so nothing can be reading the environment
    // concurrently.
    let rc = unsafe { libc::clearenv() };
    if rc != 0 {
        return Err(KcronError::sandbox(
            "clearenv",
            std::io::Error::last_os_error(),
        ));
    }
    tracing::debug!("environment cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumping_and_new_privileges_can_be_locked_without_a_tracer() {
        // no_new_privs is per-thread, so keep it off the harness thread.
        let outcome = std::thread::spawn(|| -> Result<(bool, bool)> {
            disable_dumping()?;
            forbid_new_privileges()?;
            let dumpable = prctl::get_dumpable().map_err(|e| KcronError::sandbox("get", e))?;
            let no_new_privs =
                prctl::get_no_new_privs().map_err(|e| KcronError::sandbox("get", e))?;
            Ok((dumpable, no_new_privs))
        })
        .join()
        .expect("hardening thread panicked");

        let (dumpable, no_new_privs) = outcome.expect("hardening failed");
        assert!(!dumpable);
        assert!(no_new_privs);
    }
}
