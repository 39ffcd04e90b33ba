//! Backend-plugin traits
//!
//! The embedded SQL engine performs every file-system operation through a
//! pluggable backend: a [`Vfs`] resolves paths and opens files, and each open
//! file exposes the per-file method table as a [`VfsFile`]. One backend may
//! wrap another to interpose behavior; the ZNS shim in [`crate::shim`] does
//! exactly that around the host backend.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bitflags::bitflags;

use super::error::{VfsError, VfsResult};

/// Sector size reported by the host backend
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

bitflags! {
    /// Flags the engine passes to [`Vfs::open`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ_ONLY = 0x0001;
        const READ_WRITE = 0x0002;
        const CREATE = 0x0004;
        const DELETE_ON_CLOSE = 0x0008;
        const EXCLUSIVE = 0x0010;
        /// Main database file
        const MAIN_DB = 0x0100;
        /// Rollback journal
        const JOURNAL = 0x0200;
        /// Write-ahead log
        const WAL = 0x0400;
    }
}

bitflags! {
    /// Device characteristics advertised to the engine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceCaps: u32 {
        const ATOMIC = 0x0001;
        const SAFE_APPEND = 0x0002;
        const SEQUENTIAL = 0x0004;
        const POWERSAFE_OVERWRITE = 0x0008;
        const IMMUTABLE = 0x0010;
        const BATCH_ATOMIC = 0x0020;
    }
}

/// What [`Vfs::access`] should test for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    /// Does the file exist at all
    Exists,
    /// Is the file readable and writable
    ReadWrite,
    /// Is the file readable
    Read,
}

/// How hard [`VfsFile::sync`] must push bytes toward the platter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Data sync; metadata may lag
    Normal,
    /// Data and metadata
    Full,
}

/// File lock escalation levels, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockLevel {
    Unlocked,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

/// Out-of-band per-file operations
#[derive(Debug, Clone, Copy)]
pub enum ControlOp {
    /// Advisory hint of the file's eventual size
    SizeHint(u64),
    /// Backend-specific opcode, passed through uninterpreted
    Raw(i32),
}

/// Opaque handle returned by [`Vfs::dl_open`]
pub struct DlHandle(pub(crate) *mut c_void);

/// Symbol address resolved by [`Vfs::dl_sym`]
pub type DlSymbol = *mut c_void;

/// Per-file method table returned by [`Vfs::open`]
pub trait VfsFile: Send {
    /// Release per-handle resources before the handle is dropped
    fn close(&mut self) -> VfsResult<()>;

    /// Read up to `buf.len()` bytes at `offset`; returns the count actually
    /// read (short at end of file, caller zero-fills)
    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize>;

    fn write_at(&mut self, data: &[u8], offset: u64) -> VfsResult<()>;

    fn truncate(&mut self, size: u64) -> VfsResult<()>;

    fn sync(&mut self, mode: SyncMode) -> VfsResult<()>;

    fn file_size(&self) -> VfsResult<u64>;

    /// Escalate to `level`; a no-op when already at or above it
    fn lock(&mut self, level: LockLevel) -> VfsResult<()>;

    /// Downgrade to `level` (`Unlocked` or `Shared`)
    fn unlock(&mut self, level: LockLevel) -> VfsResult<()>;

    /// True when any handle holds a Reserved or higher lock on the file
    fn check_reserved_lock(&self) -> VfsResult<bool>;

    fn file_control(&mut self, op: ControlOp) -> VfsResult<()>;

    fn sector_size(&self) -> u32;

    fn device_characteristics(&self) -> DeviceCaps;

    /// Map one region of the shared-memory index file.
    ///
    /// The shim never interprets shared memory; these four methods exist so
    /// a wrapping backend can delegate them to a host backend that does.
    fn shm_map(&mut self, _region: u32, _region_size: u32, _extend: bool) -> VfsResult<()> {
        Err(VfsError::NotSupported("shm_map"))
    }

    fn shm_lock(&mut self, _offset: u32, _count: u32, _exclusive: bool) -> VfsResult<()> {
        Err(VfsError::NotSupported("shm_lock"))
    }

    fn shm_barrier(&self) {}

    fn shm_unmap(&mut self, _delete: bool) -> VfsResult<()> {
        Ok(())
    }

    /// Borrow a memory-mapped view of the file, if the backend maps files.
    /// `Ok(None)` means "no mapping available"; the engine falls back to
    /// [`VfsFile::read_at`].
    fn fetch(&self, _offset: u64, _amount: usize) -> VfsResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn unfetch(&mut self, _offset: u64) -> VfsResult<()> {
        Ok(())
    }
}

/// The backend-plugin interface consumed by the engine
pub trait Vfs: Send + Sync {
    type File: VfsFile;

    /// Open `path`, returning the handle and the flags actually honored
    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<(Self::File, OpenFlags)>;

    fn delete(&self, path: &Path, sync_dir: bool) -> VfsResult<()>;

    fn access(&self, path: &Path, check: AccessCheck) -> VfsResult<bool>;

    fn full_pathname(&self, path: &Path) -> VfsResult<PathBuf>;

    fn randomness(&self, buf: &mut [u8]);

    /// Sleep for at least `duration`; returns the time actually slept
    fn sleep(&self, duration: Duration) -> Duration;

    /// Current time as a Julian Day number
    fn current_time(&self) -> VfsResult<f64>;

    /// Current time in Julian Day milliseconds.
    ///
    /// Derived from [`Vfs::current_time`] for backends that only implement
    /// the float clock.
    fn current_time_millis(&self) -> VfsResult<i64> {
        Ok((self.current_time()? * 86_400_000.0) as i64)
    }

    /// Errno and message of the most recent host-backend failure
    fn last_error(&self) -> Option<(i32, String)> {
        None
    }

    /// Dynamic-loader quartet. Backends without a loader keep the defaults.
    fn dl_open(&self, _path: &Path) -> Option<DlHandle> {
        None
    }

    fn dl_error(&self) -> Option<String> {
        None
    }

    fn dl_sym(&self, _handle: &DlHandle, _symbol: &str) -> Option<DlSymbol> {
        None
    }

    fn dl_close(&self, _handle: DlHandle) {}
}
