//! CLI command definitions and dispatch.

pub mod init;
pub mod name;
pub mod policy;
pub mod remove;

use clap::{ArgAction, Parser, Subcommand};
use kcron_common::config::KcronConfig;
use kcron_core::capability::PrivilegeBroker;
use kcron_core::hardening::{Confined, FilesystemScope, Hardened, confine};
use kcron_core::identity::Identity;

/// kcron — provision and locate the per-user keytab used by cron jobs.
#[derive(Parser, Debug)]
#[command(name = "kcron", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase diagnostic output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the caller's keytab if missing and print its path.
    Init,
    /// Delete the caller's keytab if present.
    Remove,
    /// Print the caller's keytab path without touching the filesystem.
    Name,
    /// Print the compiled-in policy as JSON.
    Policy(policy::PolicyArgs),
}

/// Everything a command needs from `main`.
#[derive(Debug)]
pub struct Session<'a> {
    /// Broker holding the process capabilities.
    pub broker: &'a PrivilegeBroker,
    /// Compiled-in policy.
    pub config: &'a KcronConfig,
    /// Proof that the process was hardened.
    pub hardened: Hardened,
}

impl Session<'_> {
    /// Confines the process to `scope` and returns the caller's identity,
    /// gathered while name-service lookups are still possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be resolved or the sandbox
    /// cannot be installed.
    pub fn confine_caller(self, scope: &FilesystemScope) -> anyhow::Result<(Identity, Confined)> {
        let identity = Identity::current()?;
        let confined = confine(self.hardened, self.config, scope)?;
        Ok((identity, confined))
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(command: Command, session: Session<'_>) -> anyhow::Result<()> {
    match command {
        Command::Init => init::execute(session),
        Command::Remove => remove::execute(session),
        Command::Name => name::execute(session),
        Command::Policy(args) => policy::execute(&args, session),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_counts_repeated_flags() {
        let cli = Cli::try_parse_from(["kcron", "-vv", "init"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Init));
    }

    #[test]
    fn policy_accepts_compact_flag() {
        let cli = Cli::try_parse_from(["kcron", "policy", "--compact"]).unwrap();
        assert!(matches!(cli.command, Command::Policy(policy::PolicyArgs { compact: true })));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["kcron", "destroy"]).is_err());
    }
}
