//! # kcron-core
//!
//! Privileged filesystem operations for the kcron keytab helpers.
//!
//! This crate provides:
//! - **Capabilities**: a broker that raises a named capability set around a
//!   single syscall and lowers it again on every exit path.
//! - **Filesystem**: a directory handle type exposing only descriptor-relative
//!   operations, and the directory/keytab provisioners and removal built on it.
//! - **Hardening**: resource limits, non-dumpability, environment
//!   scrubbing, Landlock scoping and a seccomp allow-list.
//! - **Identity**: the real uid/gid, username and hostname of the caller.
//!
//! Syscalls go through nix wrappers. The one remaining `unsafe` call,
//! `clearenv`, carries a `// SAFETY:` comment.

#![cfg(target_os = "linux")]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod capability;
pub mod filesystem;
pub mod hardening;
pub mod identity;
