//! Output helpers for CLI commands.
//!
//! Standard output carries exactly one newline-terminated line on success
//! (a path, or the policy JSON). Failures become one line on stderr.

use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::ExitCode;

/// Writes `path` and a newline to `out` and flushes it.
///
/// # Errors
///
/// Returns an error if writing or flushing fails.
pub fn write_path(out: &mut impl Write, path: &Path) -> io::Result<()> {
    out.write_all(path.as_os_str().as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Prints `path` on standard output.
///
/// # Errors
///
/// Returns an error if standard output cannot be written.
#[cfg(target_os = "linux")]
pub fn emit_path(path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    write_path(&mut io::stdout().lock(), path).context("cannot write to standard output")
}

/// Prints `value` as JSON on standard output.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
#[cfg(target_os = "linux")]
pub fn emit_json(value: &impl serde::Serialize, pretty: bool) -> anyhow::Result<()> {
    use anyhow::Context;

    let mut out = io::stdout().lock();
    let written = if pretty {
        serde_json::to_writer_pretty(&mut out, value)
    } else {
        serde_json::to_writer(&mut out, value)
    };
    written.map_err(kcron_common::error::KcronError::from)?;
    out.write_all(b"\n")
        .and_then(|()| out.flush())
        .context("cannot write to standard output")
}

/// One diagnostic line for `err`, including its causes.
#[must_use]
pub fn error_line(err: &anyhow::Error) -> String {
    format!("{}: {err:#}", kcron_common::constants::BIN_NAME)
}

/// Prints `err` on stderr as a single line and yields a failing exit code.
#[allow(clippy::print_stderr)]
pub fn report_error(err: &anyhow::Error) -> ExitCode {
    eprintln!("{}", error_line(err));
    ExitCode::FAILURE
}
