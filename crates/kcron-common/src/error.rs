//! Unified error types for the kcron workspace.
//!
//! Every variant is terminal for the current invocation. Variants carry the
//! failed operation and, where one exists, the target path so that the CLI
//! can print a single diagnostic line.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum KcronError {
    /// Querying, setting or clearing the capability sets failed.
    #[error("cannot {op} capabilities [{caps}]: {message}")]
    Privilege {
        /// Capability operation that failed (`clear`, `raise`, ...).
        op: &'static str,
        /// Names of the capabilities involved.
        caps: String,
        /// Description of the failure.
        message: String,
    },

    /// A filesystem syscall failed while provisioning or removing.
    #[error("{op} {path} failed")]
    Provisioning {
        /// Syscall or operation that failed.
        op: &'static str,
        /// Path of the object being operated on.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An existing object is required to be a directory but is not.
    #[error("{path} is not a directory")]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },

    /// An existing object is required to be a regular file but is not.
    #[error("{path} is not a regular file")]
    NotARegularFile {
        /// Offending path.
        path: PathBuf,
    },

    /// Resource limits, the syscall filter or the filesystem sandbox could
    /// not be installed.
    #[error("sandbox setup failed at {step}: {message}")]
    SandboxSetup {
        /// Hardening step that failed.
        step: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The invoking user or host could not be identified.
    #[error("cannot resolve {what}: {message}")]
    Resolution {
        /// Value being resolved (`username`, `hostname`, ...).
        what: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A compiled-in policy value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization of the policy report failed.
    #[error("cannot serialize policy")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl KcronError {
    /// Builds a [`KcronError::Provisioning`] for `op` on `path`.
    pub fn provisioning(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Provisioning {
            op,
            path: path.into(),
            source,
        }
    }

    /// Builds a [`KcronError::SandboxSetup`] for the given hardening step.
    pub fn sandbox(step: &'static str, message: impl ToString) -> Self {
        Self::SandboxSetup {
            step,
            message: message.to_string(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, KcronError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_error_names_operation_and_path() {
        let err = KcronError::provisioning(
            "mkdir",
            "/var/kcron/1000",
            std::io::Error::from_raw_os_error(13),
        );
        assert_eq!(err.to_string(), "mkdir /var/kcron/1000 failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn privilege_error_lists_capabilities() {
        let err = KcronError::Privilege {
            op: "raise",
            caps: "CAP_CHOWN".into(),
            message: "not permitted".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot raise capabilities [CAP_CHOWN]: not permitted"
        );
    }

    #[test]
    fn sandbox_error_names_step() {
        let err = KcronError::sandbox("rlimit", "RLIMIT_NPROC: EPERM");
        assert_eq!(
            err.to_string(),
            "sandbox setup failed at rlimit: RLIMIT_NPROC: EPERM"
        );
    }
}
