//! `kcron init` — create the caller's keytab if missing and print its path.

use kcron_core::filesystem::keytab::Provision;
use kcron_core::filesystem::{ensure_shared_root, provision_keytab};
use kcron_core::hardening::FilesystemScope;

use super::Session;
use crate::output;

/// Executes the `init` command.
///
/// # Errors
///
/// Returns an error if the shared root cannot be bootstrapped, or if
/// confinement, path resolution or provisioning fails.
pub fn execute(session: Session<'_>) -> anyhow::Result<()> {
    let (broker, config) = (session.broker, session.config);
    ensure_shared_root(broker, config)?;
    let (identity, confined) = session.confine_caller(&FilesystemScope::for_provisioning(config))?;
    tracing::debug!(landlock = ?confined.landlock(), "confined for provisioning");

    let keytab = identity.keytab_path(&config.shared_root)?;
    let provision = provision_keytab(broker, config, identity.uid, identity.gid, &keytab)?;
    if matches!(provision, Provision::Untouched) {
        tracing::info!(path = %keytab, "keytab already present");
    }

    output::emit_path(&keytab.full_path())?;
    broker.relinquish()?;
    Ok(())
}
