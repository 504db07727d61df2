//! Linux capability brokering for least-privilege execution.
//!
//! The process rests with an empty effective set. A [`PrivilegeBroker`]
//! raises exactly one named [`PrivilegeSet`] around a single operation and
//! clears the effective set again before returning, whether the operation
//! succeeded, failed or panicked.
//!
//! Under a superuser effective uid (setuid-root installs) raising and
//! lowering is pointless, so the broker runs the operation as-is.

use std::fmt;

use caps::{CapSet, Capability, CapsHashSet};
use kcron_common::error::{KcronError, Result};

/// A fixed, named set of capabilities requested for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeSet {
    name: &'static str,
    caps: &'static [Capability],
}

impl PrivilegeSet {
    /// `mkdir` inside a directory the caller cannot write.
    pub const CREATE_DIRECTORY: Self = Self {
        name: "create-directory",
        caps: &[Capability::CAP_DAC_OVERRIDE],
    };

    /// Create the keytab inside the per-uid directory.
    pub const CREATE_FILE: Self = Self {
        name: "create-file",
        caps: &[Capability::CAP_DAC_OVERRIDE],
    };

    /// Open an existing keytab for normalization.
    pub const OPEN_FILE: Self = Self {
        name: "open-file",
        caps: &[Capability::CAP_DAC_OVERRIDE],
    };

    /// Unlink the keytab.
    pub const REMOVE_FILE: Self = Self {
        name: "remove-file",
        caps: &[Capability::CAP_DAC_OVERRIDE],
    };

    /// `fchown` a directory or keytab.
    pub const CHANGE_OWNER: Self = Self {
        name: "change-owner",
        caps: &[Capability::CAP_CHOWN],
    };

    /// `fchmod` an object the caller does not own.
    pub const CHANGE_MODE: Self = Self {
        name: "change-mode",
        caps: &[Capability::CAP_FOWNER],
    };

    /// Union of every set above; the permitted set is narrowed to this at rest.
    pub const PROVISIONING: Self = Self {
        name: "provisioning",
        caps: &[
            Capability::CAP_CHOWN,
            Capability::CAP_DAC_OVERRIDE,
            Capability::CAP_FOWNER,
        ],
    };

    /// Short name of the set, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Capabilities in the set.
    #[must_use]
    pub const fn capabilities(&self) -> &'static [Capability] {
        self.caps
    }

    fn to_set(self) -> CapsHashSet {
        self.caps.iter().copied().collect()
    }
}

impl fmt::Display for PrivilegeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, cap_names(self.caps.iter()))
    }
}

fn cap_names<'a>(caps: impl Iterator<Item = &'a Capability>) -> String {
    let mut names: Vec<String> = caps.map(ToString::to_string).collect();
    names.sort();
    names.join(",")
}

/// Access to the calling process's capability sets.
///
/// Implemented by [`ProcessCapabilities`] for the real process; the seam
/// lets the broker's raise/lower discipline be exercised without privilege.
pub trait CapabilityState {
    /// Whether the effective uid is 0, making capability juggling moot.
    fn is_superuser(&self) -> bool;

    /// Current permitted set.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if the set cannot be read.
    fn permitted(&self) -> Result<CapsHashSet>;

    /// Replaces the effective set with `caps`.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if `capset(2)` fails.
    fn set_effective(&self, caps: &CapsHashSet) -> Result<()>;

    /// Empties the effective set.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if `capset(2)` fails.
    fn clear_effective(&self) -> Result<()>;

    /// Narrows the permitted set to `keep` and empties the inheritable and
    /// ambient sets.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if any set cannot be changed.
    fn restrict_permitted(&self, keep: &CapsHashSet) -> Result<()>;

    /// Gives up every privilege for the rest of the process life.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if privilege cannot be dropped.
    fn relinquish(&self) -> Result<()>;
}

/// The capability sets of the calling thread, via `capget(2)`/`capset(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCapabilities;

fn privilege_error(op: &'static str, caps: String, err: impl fmt::Display) -> KcronError {
    KcronError::Privilege {
        op,
        caps,
        message: err.to_string(),
    }
}

impl CapabilityState for ProcessCapabilities {
    fn is_superuser(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn permitted(&self) -> Result<CapsHashSet> {
        caps::read(None, CapSet::Permitted)
            .map_err(|e| privilege_error("read", "permitted".into(), e))
    }

    fn set_effective(&self, caps: &CapsHashSet) -> Result<()> {
        caps::set(None, CapSet::Effective, caps)
            .map_err(|e| privilege_error("raise", cap_names(caps.iter()), e))
    }

    fn clear_effective(&self) -> Result<()> {
        caps::clear(None, CapSet::Effective)
            .map_err(|e| privilege_error("clear", "effective".into(), e))
    }

    fn restrict_permitted(&self, keep: &CapsHashSet) -> Result<()> {
        let narrowed: CapsHashSet = self.permitted()?.intersection(keep).copied().collect();
        caps::set(None, CapSet::Permitted, &narrowed)
            .map_err(|e| privilege_error("narrow", cap_names(narrowed.iter()), e))?;
        caps::clear(None, CapSet::Inheritable)
            .map_err(|e| privilege_error("clear", "inheritable".into(), e))?;
        caps::clear(None, CapSet::Ambient)
            .map_err(|e| privilege_error("clear", "ambient".into(), e))?;
        tracing::debug!(permitted = %cap_names(narrowed.iter()), "permitted set narrowed");
        Ok(())
    }

    fn relinquish(&self) -> Result<()> {
        use nix::unistd::{getgid, getuid, setresgid, setresuid};

        if self.is_superuser() {
            let (uid, gid) = (getuid(), getgid());
            if uid.is_root() {
                return Ok(());
            }
            // Group first: once the uid is dropped setresgid is no longer allowed.
            setresgid(gid, gid, gid)
                .map_err(|e| privilege_error("drop", format!("gid {gid}"), e))?;
            setresuid(uid, uid, uid)
                .map_err(|e| privilege_error("drop", format!("uid {uid}"), e))?;
            tracing::debug!(uid = uid.as_raw(), gid = gid.as_raw(), "switched to real ids");
            return Ok(());
        }

        for (set, name) in [
            (CapSet::Effective, "effective"),
            (CapSet::Permitted, "permitted"),
            (CapSet::Inheritable, "inheritable"),
        ] {
            caps::clear(None, set).map_err(|e| privilege_error("clear", name.into(), e))?;
        }
        tracing::debug!("all capability sets cleared");
        Ok(())
    }
}

/// Raises a [`PrivilegeSet`] for the duration of one closure.
#[derive(Debug, Default)]
pub struct PrivilegeBroker<S = ProcessCapabilities> {
    state: S,
}

impl<S: CapabilityState> PrivilegeBroker<S> {
    /// Creates a broker over the given capability state.
    pub const fn new(state: S) -> Self {
        Self { state }
    }

    /// Capability state this broker drives.
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Runs `op` with exactly `requested` in the effective set.
    ///
    /// The effective set is cleared before raising and cleared again after
    /// `op` returns, on every path. If clearing afterwards fails that error
    /// wins over `op`'s result, since the privilege state is then unknown.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if the set cannot be cleared,
    /// raised or lowered, or if `requested` is not in the permitted set.
    /// Otherwise returns whatever `op` returns.
    pub fn with_privilege<T>(
        &self,
        requested: PrivilegeSet,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        if self.state.is_superuser() {
            return op();
        }

        self.state.clear_effective()?;

        let permitted = self.state.permitted()?;
        let missing: Vec<&Capability> = requested
            .capabilities()
            .iter()
            .filter(|cap| !permitted.contains(cap))
            .collect();
        if !missing.is_empty() {
            return Err(KcronError::Privilege {
                op: "raise",
                caps: cap_names(missing.into_iter()),
                message: "not in the permitted set".into(),
            });
        }

        let raised = Raised {
            state: &self.state,
            armed: true,
        };
        self.state.set_effective(&requested.to_set())?;
        tracing::debug!(set = %requested, "capabilities raised");

        let outcome = op();
        raised.lower()?;
        tracing::debug!(set = requested.name(), "capabilities lowered");
        outcome
    }

    /// Puts the process into its resting state: empty effective set and a
    /// permitted set narrowed to [`PrivilegeSet::PROVISIONING`].
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if any set cannot be changed.
    pub fn rest(&self) -> Result<()> {
        if self.state.is_superuser() {
            return Ok(());
        }
        self.state.clear_effective()?;
        self.state
            .restrict_permitted(&PrivilegeSet::PROVISIONING.to_set())
    }

    /// Drops all privilege for the remainder of the process life.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Privilege`] if privilege cannot be dropped.
    pub fn relinquish(&self) -> Result<()> {
        self.state.relinquish()
    }
}

/// Clears the effective set when dropped unless lowered explicitly.
struct Raised<'a, S: CapabilityState> {
    state: &'a S,
    armed: bool,
}

impl<S: CapabilityState> Raised<'_, S> {
    fn lower(mut self) -> Result<()> {
        self.armed = false;
        self.state.clear_effective()
    }
}

impl<S: CapabilityState> Drop for Raised<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.state.clear_effective() {
                tracing::error!(error = %e, "failed to lower capabilities while unwinding");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// One observed change to the fake capability state.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Clear,
        Raise(String),
        Restrict(String),
        Relinquish,
    }

    /// In-memory capability state that records every change.
    #[derive(Debug, Default)]
    pub struct RecordingCapabilities {
        pub superuser: bool,
        pub permitted: RefCell<CapsHashSet>,
        pub effective: RefCell<CapsHashSet>,
        pub events: RefCell<Vec<Event>>,
        pub fail_raise: Cell<bool>,
        pub fail_clear: Cell<bool>,
    }

    impl RecordingCapabilities {
        /// A non-root process holding every provisioning capability.
        pub fn provisioning() -> Self {
            Self {
                permitted: RefCell::new(PrivilegeSet::PROVISIONING.to_set()),
                ..Self::default()
            }
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.borrow().clone()
        }

        pub fn raised_sets(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Raise(names) => Some(names),
                    _ => None,
                })
                .collect()
        }
    }

    fn injected(op: &'static str) -> KcronError {
        KcronError::Privilege {
            op,
            caps: "injected".into(),
            message: "injected failure".into(),
        }
    }

    impl CapabilityState for RecordingCapabilities {
        fn is_superuser(&self) -> bool {
            self.superuser
        }

        fn permitted(&self) -> Result<CapsHashSet> {
            Ok(self.permitted.borrow().clone())
        }

        fn set_effective(&self, caps: &CapsHashSet) -> Result<()> {
            if self.fail_raise.get() {
                return Err(injected("raise"));
            }
            self.events
                .borrow_mut()
                .push(Event::Raise(cap_names(caps.iter())));
            *self.effective.borrow_mut() = caps.clone();
            Ok(())
        }

        fn clear_effective(&self) -> Result<()> {
            if self.fail_clear.get() {
                return Err(injected("clear"));
            }
            self.events.borrow_mut().push(Event::Clear);
            self.effective.borrow_mut().clear();
            Ok(())
        }

        fn restrict_permitted(&self, keep: &CapsHashSet) -> Result<()> {
            let narrowed: CapsHashSet = self.permitted.borrow().intersection(keep).copied().collect();
            self.events
                .borrow_mut()
                .push(Event::Restrict(cap_names(narrowed.iter())));
            *self.permitted.borrow_mut() = narrowed;
            Ok(())
        }

        fn relinquish(&self) -> Result<()> {
            self.events.borrow_mut().push(Event::Relinquish);
            self.effective.borrow_mut().clear();
            self.permitted.borrow_mut().clear();
            Ok(())
        }
    }
}
