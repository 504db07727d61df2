//! # kcron — per-user cron keytab helper
//!
//! Meant to be installed setuid-root or with file capabilities
//! (`cap_chown,cap_dac_override,cap_fowner+p`). Every run hardens the
//! process before reading its arguments, confines it before building any
//! path from the caller's identity, and gives up all privilege before
//! exiting.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

#[cfg(target_os = "linux")]
mod commands;
mod output;

use std::process::ExitCode;

#[cfg(target_os = "linux")]
fn main() -> ExitCode {
    use clap::Parser;
    use kcron_common::config::KcronConfig;
    use kcron_core::capability::PrivilegeBroker;
    use kcron_core::hardening::harden_process;

    use crate::commands::{Cli, Session};

    let config = KcronConfig::default();
    let broker: PrivilegeBroker = PrivilegeBroker::default();

    let outcome = config
        .validate()
        .and_then(|()| harden_process(&config, &broker))
        .map_err(anyhow::Error::from)
        .and_then(|hardened| {
            let cli = Cli::parse();
            init_tracing(cli.verbose);
            commands::execute(
                cli.command,
                Session {
                    broker: &broker,
                    config: &config,
                    hardened,
                },
            )
        });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => output::report_error(&err),
    }
}

#[cfg(not(target_os = "linux"))]
fn main() -> ExitCode {
    output::report_error(&anyhow::anyhow!("Linux required for capability and sandbox support"))
}

/// Logs go to stderr only; stdout carries nothing but the keytab path. The
/// filter is never read from the environment.
#[cfg(target_os = "linux")]
fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!(
            "warn,kcron={level},kcron_core={level},kcron_common={level}"
        )))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();
}
