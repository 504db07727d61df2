//! Descriptor-anchored directory access.
//!
//! A [`DirHandle`] is an open, verified directory. Every operation it offers
//! takes a single path component and is resolved relative to the held
//! descriptor with `O_NOFOLLOW`/`AT_SYMLINK_NOFOLLOW`, so once a directory
//! has been pinned nothing can redirect later operations by swapping path
//! components underneath it.

use std::ffi::OsStr;
use std::fs::{File, Metadata, Permissions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use kcron_common::error::{KcronError, Result};
use nix::errno::Errno;
use nix::fcntl::{AtFlags, OFlag, open, openat};
use nix::sys::stat::{Mode, SFlag, fstatat, mkdirat};
use nix::unistd::{UnlinkatFlags, unlinkat};

/// Kind of a directory entry, as seen without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file.
    Regular,
    /// A symbolic link.
    Symlink,
    /// Anything else (fifo, socket, device).
    Other,
}

impl EntryKind {
    fn from_mode(mode: u32) -> Self {
        let kind = SFlag::from_bits_truncate(mode) & SFlag::S_IFMT;
        if kind == SFlag::S_IFDIR {
            Self::Directory
        } else if kind == SFlag::S_IFREG {
            Self::Regular
        } else if kind == SFlag::S_IFLNK {
            Self::Symlink
        } else {
            Self::Other
        }
    }
}

/// An open directory whose identity is pinned by its descriptor.
#[derive(Debug)]
pub struct DirHandle {
    dir: File,
    path: PathBuf,
}

impl DirHandle {
    /// Opens `path` as a directory without following a final symlink and
    /// verifies the result through the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::NotADirectory`] if the final component is a
    /// symlink or not a directory, or [`KcronError::Provisioning`] for any
    /// other failure.
    pub fn open(path: &Path) -> Result<Self> {
        let fd = open(path, directory_flags(), Mode::empty())
            .map_err(|e| open_dir_error(path, e.into()))?;
        Self::verified(File::from(fd), path.to_path_buf())
    }

    fn verified(dir: File, path: PathBuf) -> Result<Self> {
        let meta = dir
            .metadata()
            .map_err(|e| KcronError::provisioning("fstat", &path, e))?;
        if !meta.is_dir() {
            return Err(KcronError::NotADirectory { path });
        }
        Ok(Self { dir, path })
    }

    /// Path this handle was opened at. Informational only.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `name` inside this directory. Informational only.
    #[must_use]
    pub fn child_path(&self, name: &OsStr) -> PathBuf {
        self.path.join(name)
    }

    /// `fstat` of the directory itself.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Provisioning`] if `fstat` fails.
    pub fn metadata(&self) -> Result<Metadata> {
        self.dir
            .metadata()
            .map_err(|e| KcronError::provisioning("fstat", &self.path, e))
    }

    /// Kind of the entry `name`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::Provisioning`] if `fstatat` fails for any reason
    /// other than the entry being absent.
    pub fn entry_kind(&self, name: &OsStr) -> Result<Option<EntryKind>> {
        let name = component(name, &self.path)?;
        match fstatat(&self.dir, name, AtFlags::AT_SYMLINK_NOFOLLOW) {
            Ok(st) => Ok(Some(EntryKind::from_mode(st.st_mode))),
            Err(Errno::ENOENT) => Ok(None),
            Err(e) => Err(KcronError::provisioning(
                "fstatat",
                self.child_path(name),
                e.into(),
            )),
        }
    }

    /// `mkdirat(2)` of `name` with `mode` (subject to the umask).
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error, so callers can tell `EEXIST` apart.
    pub fn make_dir(&self, name: &OsStr, mode: u32) -> io::Result<()> {
        let name = component_io(name)?;
        mkdirat(&self.dir, name, Mode::from_bits_truncate(mode)).map_err(io::Error::from)
    }

    /// Opens the subdirectory `name` without following symlinks and
    /// verifies it through the new descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`KcronError::NotADirectory`] if `name` is a symlink or not a
    /// directory, or [`KcronError::Provisioning`] otherwise.
    pub fn open_dir(&self, name: &OsStr) -> Result<Self> {
        let path = self.child_path(name);
        let file = self
            .open_at(name, directory_flags(), 0)
            .map_err(|e| open_dir_error(&path, e))?;
        Self::verified(file, path)
    }

    /// Creates the file `name` exclusively, write-only, never following a
    /// symlink, with `mode` applied at creation.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error; `AlreadyExists` means something, possibly
    /// a symlink, is already at `name`.
    pub fn create_file(&self, name: &OsStr, mode: u32) -> io::Result<File> {
        self.open_at(
            name,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_NOFOLLOW,
            mode,
        )
    }

    /// Opens the existing file `name` read-only without following symlinks.
    ///
    /// `O_NONBLOCK` keeps a planted fifo from stalling the open.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error.
    pub fn open_file(&self, name: &OsStr) -> io::Result<File> {
        self.open_at(
            name,
            OFlag::O_RDONLY | OFlag::O_NOFOLLOW | OFlag::O_NONBLOCK,
            0,
        )
    }

    /// `unlinkat(2)` of the non-directory entry `name`.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error.
    pub fn remove_file(&self, name: &OsStr) -> io::Result<()> {
        let name = component_io(name)?;
        unlinkat(&self.dir, name, UnlinkatFlags::NoRemoveDir).map_err(io::Error::from)
    }

    /// `fchown(2)` of the directory itself.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error.
    pub fn set_owner(&self, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::fchown(&self.dir, Some(uid), Some(gid))
    }

    /// `fchmod(2)` of the directory itself.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error.
    pub fn set_mode(&self, mode: u32) -> io::Result<()> {
        self.dir.set_permissions(Permissions::from_mode(mode))
    }

    fn open_at(&self, name: &OsStr, flags: OFlag, mode: u32) -> io::Result<File> {
        let name = component_io(name)?;
        openat(
            &self.dir,
            name,
            flags | OFlag::O_CLOEXEC,
            Mode::from_bits_truncate(mode),
        )
        .map(File::from)
        .map_err(io::Error::from)
    }
}

/// Owner, group and permission bits of an open object, read by descriptor.
#[must_use]
pub fn ownership(meta: &Metadata) -> (u32, u32, u32) {
    (meta.uid(), meta.gid(), meta.mode() & 0o7777)
}

fn directory_flags() -> OFlag {
    OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC
}

fn open_dir_error(path: &Path, err: io::Error) -> KcronError {
    match err.raw_os_error().map(Errno::from_raw) {
        Some(Errno::ELOOP | Errno::ENOTDIR) => KcronError::NotADirectory {
            path: path.to_path_buf(),
        },
        _ => KcronError::provisioning("open directory", path, err),
    }
}

/// Validates `name` as a single path component.
fn component_io(name: &OsStr) -> io::Result<&OsStr> {
    let bytes = name.as_bytes();
    if bytes.is_empty()
        || bytes == b"."
        || bytes == b".."
        || bytes.contains(&b'/')
        || bytes.contains(&0)
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a single path component", name.to_string_lossy()),
        ));
    }
    Ok(name)
}

fn component<'a>(name: &'a OsStr, parent: &Path) -> Result<&'a OsStr> {
    component_io(name).map_err(|e| KcronError::provisioning("resolve", parent.join(name), e))
}
