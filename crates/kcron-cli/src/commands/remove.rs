//! `kcron remove` — delete the caller's keytab if present.

use kcron_core::filesystem::removal::{Removal, remove_keytab};
use kcron_core::hardening::FilesystemScope;

use super::Session;

/// Executes the `remove` command. Prints nothing on success.
///
/// # Errors
///
/// Returns an error if confinement, path resolution or the unlink fails.
/// A keytab that is already absent is not an error.
pub fn execute(session: Session<'_>) -> anyhow::Result<()> {
    let (broker, config) = (session.broker, session.config);
    let (identity, _confined) =
        session.confine_caller(&FilesystemScope::for_provisioning(config))?;

    let keytab = identity.keytab_path(&config.shared_root)?;
    if remove_keytab(broker, &keytab)? == Removal::Absent {
        tracing::info!(path = %keytab, "no keytab to remove");
    }

    broker.relinquish()?;
    Ok(())
}
