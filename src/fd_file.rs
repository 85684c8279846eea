use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::os::unix::fs::FileExt;

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use tracing::warn;

/// Usage-check progression for writable handles. Ordered so that "at least
/// flushed" and "at least closed" are plain comparisons.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum GuardState {
    Base,
    Flushed,
    Closed,
    NoCheck,
}

/// An owned, open file descriptor together with the path it was opened from.
///
/// Handles opened for writing with usage checking enabled expect to be flushed
/// and then closed explicitly (see [`FdFile::flush_close`]). Dropping one that
/// is dirty or still open logs a warning; the descriptor is closed either way.
#[derive(Debug)]
pub struct FdFile {
    file: Option<File>,
    path: Utf8PathBuf,
    read_only: bool,
    guard: GuardState,
}

impl FdFile {
    pub(crate) fn new(file: File, path: &Utf8Path, read_only: bool, check_usage: bool) -> Self {
        Self {
            file: Some(file),
            path: path.to_owned(),
            read_only,
            guard: if check_usage {
                GuardState::Base
            } else {
                GuardState::NoCheck
            },
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn is_opened(&self) -> bool {
        self.file.is_some()
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn check_usage(&self) -> bool {
        self.guard != GuardState::NoCheck
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Current length in bytes, from `fstat` on the open descriptor.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        self.len().map(|len| len == 0)
    }

    pub fn set_length(&mut self, len: u64) -> io::Result<()> {
        self.file()?.set_len(len)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file_mut()?.read_exact(buf)
    }

    pub fn write_fully(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file_mut()?.write_all(buf)?;
        self.mark_dirty();
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes at `offset` without moving the cursor.
    pub fn pread_fully(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.file()?.read_exact_at(buf, offset)
    }

    /// Writes all of `buf` at `offset` without moving the cursor.
    pub fn pwrite_fully(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.file()?.write_all_at(buf, offset)?;
        self.mark_dirty();
        Ok(())
    }

    /// Pushes written data to the device (`fdatasync`).
    pub fn flush(&mut self) -> io::Result<()> {
        self.file()?.sync_data()?;
        if self.guard < GuardState::Flushed {
            self.guard = GuardState::Flushed;
        }
        Ok(())
    }

    /// Closes the descriptor without flushing. Calling it again is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if self.guard < GuardState::Flushed {
            warn!(path = %self.path, "file was not flushed before closing");
        }
        if self.guard < GuardState::Closed {
            self.guard = GuardState::Closed;
        }
        nix::unistd::close(file.into_raw_fd()).map_err(io::Error::from)
    }

    /// Flushes, then closes. The descriptor is closed even if the flush fails;
    /// the first error is returned.
    pub fn flush_close(&mut self) -> io::Result<()> {
        let flushed = self.flush();
        if flushed.is_err() && self.guard < GuardState::Flushed {
            // Don't report the same problem twice.
            self.guard = GuardState::Flushed;
        }
        let closed = self.close();
        flushed.and(closed)
    }

    /// Stops tracking flush/close discipline for this handle.
    pub fn mark_unchecked(&mut self) {
        self.guard = GuardState::NoCheck;
    }

    /// Gives up ownership of the underlying file. Returns `None` once closed.
    pub fn release(mut self) -> Option<File> {
        self.guard = GuardState::NoCheck;
        self.file.take()
    }

    fn mark_dirty(&mut self) {
        if self.guard == GuardState::Flushed {
            self.guard = GuardState::Base;
        }
    }

    fn file(&self) -> io::Result<&File> {
        self.file.as_ref().ok_or_else(|| io::Error::from(Errno::EBADF))
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(|| io::Error::from(Errno::EBADF))
    }
}

impl Read for FdFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut()?.read(buf)
    }
}

impl Write for FdFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file_mut()?.write(buf)?;
        self.mark_dirty();
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        FdFile::flush(self)
    }
}

impl Seek for FdFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut()?.seek(pos)
    }
}

impl Drop for FdFile {
    fn drop(&mut self) {
        if self.guard < GuardState::NoCheck {
            if self.guard < GuardState::Flushed {
                warn!(path = %self.path, "file was not flushed before being dropped");
            }
            if self.guard < GuardState::Closed {
                warn!(path = %self.path, "file was not closed before being dropped");
            }
        }
    }
}
