//! `kcron name` — print the caller's keytab path.

use kcron_core::hardening::FilesystemScope;

use super::Session;
use crate::output;

/// Executes the `name` command. The process is confined with no filesystem
/// access at all before the path is built.
///
/// # Errors
///
/// Returns an error if confinement or path resolution fails.
pub fn execute(session: Session<'_>) -> anyhow::Result<()> {
    let (broker, config) = (session.broker, session.config);
    let (identity, _confined) = session.confine_caller(&FilesystemScope::Nothing)?;

    let keytab = identity.keytab_path(&config.shared_root)?;
    output::emit_path(&keytab.full_path())?;
    broker.relinquish()?;
    Ok(())
}
