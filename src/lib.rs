//! File-system helpers for runtime components: opening files with explicit
//! POSIX flags, replacing files with fresh empty ones, existence checks,
//! recursive directory creation and size queries.

pub mod fd_file;
pub mod os;

pub use fd_file::FdFile;
