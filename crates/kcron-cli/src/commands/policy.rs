//! `kcron policy` — print the compiled-in policy.

use clap::Args;
use kcron_core::hardening::{FilesystemScope, confine};

use super::Session;
use crate::output;

/// Arguments for the `policy` command.
#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Print the JSON on a single line.
    #[arg(long)]
    pub compact: bool,
}

/// Executes the `policy` command.
///
/// # Errors
///
/// Returns an error if confinement or serialization fails.
pub fn execute(args: &PolicyArgs, session: Session<'_>) -> anyhow::Result<()> {
    let _confined = confine(session.hardened, session.config, &FilesystemScope::Nothing)?;
    output::emit_json(session.config, !args.compact)?;
    session.broker.relinquish()?;
    Ok(())
}
