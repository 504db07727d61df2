//! Helpers shared by the integration suites.

#![allow(dead_code)]

use std::path::Path;

use caps::CapsHashSet;
use kcron_common::config::KcronConfig;
use kcron_common::error::Result;
use kcron_core::capability::{CapabilityState, PrivilegeSet};
use nix::unistd::{getgid, getuid};

/// Pretends to hold the provisioning capabilities without touching the
/// real capability sets, so the suite runs unprivileged.
#[derive(Debug, Default)]
pub struct Unprivileged;

impl CapabilityState for Unprivileged {
    fn is_superuser(&self) -> bool {
        false
    }

    fn permitted(&self) -> Result<CapsHashSet> {
        Ok(PrivilegeSet::PROVISIONING
            .capabilities()
            .iter()
            .copied()
            .collect())
    }

    fn set_effective(&self, _caps: &CapsHashSet) -> Result<()> {
        Ok(())
    }

    fn clear_effective(&self) -> Result<()> {
        Ok(())
    }

    fn restrict_permitted(&self, _keep: &CapsHashSet) -> Result<()> {
        Ok(())
    }

    fn relinquish(&self) -> Result<()> {
        Ok(())
    }
}

pub fn scratch_config(root: &Path) -> KcronConfig {
    let mut config = KcronConfig {
        shared_root: root.join("var").join("kcron"),
        ..KcronConfig::default()
    };
    for spec in [&mut config.shared_root_spec, &mut config.intermediate_spec] {
        spec.owner = getuid().as_raw();
        spec.group = getgid().as_raw();
    }
    config
}
