//! # kcron-common
//!
//! Shared types, error definitions, compiled-in policy and constants
//! used across the kcron workspace.
//!
//! This crate is the leaf of the dependency graph. It performs no system
//! calls and holds no privilege; everything here is plain data.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
