//! Thin wrappers over `open`, `stat`, `mkdir` and `unlink`.
//!
//! Every function here is stateless and blocking. Failures are reported through
//! `io::Result`, `Option` or `false`; none of them panic.
//!
//! Paths are `camino::Utf8Path`, so POSIX paths that are not valid UTF-8 can't
//! be passed in at all. Callers holding such a path must reject it before
//! reaching this module.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

use camino::Utf8Path;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use tracing::debug;

use crate::fd_file::FdFile;

/// Permission bits for every file created here: `S_IRUSR | S_IWUSR | S_IRGRP | S_IROTH`.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default mode for `create_directory` when the caller has no preference.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;

pub fn open_file_for_reading(path: &Utf8Path) -> io::Result<FdFile> {
    open_file_with_flags(path, OFlag::O_RDONLY, true)
}

pub fn open_file_read_write(path: &Utf8Path) -> io::Result<FdFile> {
    open_file_with_flags(path, OFlag::O_RDWR, true)
}

/// Creates `path` as a new empty file opened read-write, replacing whatever
/// was there before.
pub fn create_empty_file(path: &Utf8Path) -> io::Result<FdFile> {
    create_empty(path, OFlag::O_RDWR | OFlag::O_TRUNC)
}

/// Like [`create_empty_file`] but write-only, refusing to follow a symlink at
/// `path` and keeping the descriptor out of child processes.
pub fn create_empty_file_write_only(path: &Utf8Path) -> io::Result<FdFile> {
    create_empty(
        path,
        OFlag::O_WRONLY | OFlag::O_TRUNC | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC,
    )
}

fn create_empty(path: &Utf8Path, extra_flags: OFlag) -> io::Result<FdFile> {
    // The old file may still be open elsewhere and must not change underneath
    // its readers, so unlink it and start from a fresh inode.
    let _ = fs::remove_file(path);

    open_file_with_flags(path, OFlag::O_CREAT | extra_flags, true)
}

/// Opens `path` with the given POSIX flags and [`DEFAULT_FILE_MODE`].
///
/// Writable handles get usage checking (flush and close before drop) when
/// `auto_flush` is set; read-only handles never do.
pub fn open_file_with_flags(path: &Utf8Path, flags: OFlag, auto_flush: bool) -> io::Result<FdFile> {
    let access = flags & OFlag::O_ACCMODE;
    let read_only = access == OFlag::O_RDONLY;
    let check_usage = !read_only && auto_flush;

    let mut options = OpenOptions::new();
    if read_only {
        options.read(true);
    } else if access == OFlag::O_WRONLY {
        options.write(true);
    } else if access == OFlag::O_RDWR {
        options.read(true).write(true);
    } else {
        return Err(Errno::EINVAL.into());
    }
    // Creation and status flags go straight to open(2); the access mode is
    // taken from read/write above.
    options
        .custom_flags(flags.difference(OFlag::O_ACCMODE).bits())
        .mode(DEFAULT_FILE_MODE);

    match options.open(path) {
        Ok(file) => Ok(FdFile::new(file, path, read_only, check_usage)),
        Err(err) => {
            debug!(path = %path, ?flags, error = %err, "open failed");
            Err(err)
        }
    }
}

/// Returns true if something exists at `path`, or with `check_file_type`, if
/// it is a regular file. Symlinks are followed.
pub fn file_exists(path: &Utf8Path, check_file_type: bool) -> bool {
    match path.metadata() {
        Ok(meta) => !check_file_type || meta.is_file(),
        Err(_) => false,
    }
}

pub fn directory_exists(path: &Utf8Path) -> bool {
    path.metadata().map(|meta| meta.is_dir()).unwrap_or(false)
}

/// Ensures `path` and all of its ancestors exist as directories, creating the
/// missing ones with `mode`.
///
/// Only a missing ancestor (`ENOENT`) triggers recursion into the parent, after
/// which the final component is retried once. Every other `mkdir` error is
/// returned as is.
pub fn create_directory(path: &Utf8Path, mode: u32) -> io::Result<()> {
    if directory_exists(path) {
        return Ok(());
    }

    let err = match mkdir(path, mode) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if err.raw_os_error() != Some(Errno::ENOENT as i32) {
        debug!(path = %path, error = %err, "mkdir failed");
        return Err(err);
    }

    // Component-wise parent rather than the text before the last '/': for
    // `a/b/` that yields `a`, so the retry below targets `a/b/` and not an
    // already-created directory.
    let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) else {
        return Err(err);
    };
    debug!(path = %path, parent = %parent, "creating missing ancestor");
    create_directory(parent, mode)?;

    mkdir(path, mode)
}

fn mkdir(path: &Utf8Path, mode: u32) -> io::Result<()> {
    DirBuilder::new().mode(mode).create(path)
}

/// Size in bytes as reported by `stat`, or `None` if `path` can't be stat'ed.
pub fn file_size_bytes(path: &Utf8Path) -> Option<u64> {
    path.metadata().map(|meta| meta.len()).ok()
}
