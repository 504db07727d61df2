//! System-wide constants and compiled-in policy defaults.
//!
//! The shared keytab root can be moved at build time by setting
//! `KCRON_KEYTAB_DIR` in the build environment. Nothing here is read
//! from the runtime environment.

/// Shared directory holding one subdirectory per uid.
pub const KEYTAB_DIR: &str = match option_env!("KCRON_KEYTAB_DIR") {
    Some(dir) => dir,
    None => "/var/kcron",
};

/// Marker bytes of an empty keytab container.
///
/// `ktutil` and `kadmin` accept a file holding exactly these two bytes as a
/// valid keytab with no entries.
pub const EMPTY_KEYTAB: [u8; 2] = [0x05, 0x02];

/// Mode of a freshly created keytab (`rw-------`).
pub const KEYTAB_MODE: u32 = 0o600;

/// Mode of the per-uid keytab directory (`rwx------`).
pub const USER_DIR_MODE: u32 = 0o700;

/// Mode of missing ancestors created on the way to the per-uid directory.
pub const INTERMEDIATE_DIR_MODE: u32 = 0o711;

/// Mode of the shared keytab root (`rwx--x--t`).
pub const SHARED_ROOT_MODE: u32 = 0o1711;

/// Owner and group of the shared root and its missing ancestors.
pub const ROOT_ID: u32 = 0;

/// Separator between username and hostname in the keytab file name.
pub const CRON_INFIX: &str = ".cron.";

/// Extension of the keytab file name.
pub const KEYTAB_EXTENSION: &str = ".keytab";

/// Longest username accepted from the password database.
pub const USERNAME_MAX_LENGTH: usize = 256;

/// Longest hostname accepted from `gethostname(2)`.
pub const HOSTNAME_MAX_LENGTH: usize = 255;

/// Longest keytab path the resolver will produce.
pub const FILE_PATH_MAX_LENGTH: usize = 4096;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "kcron";
