//! Open-handle types returned by the shim
//!
//! [`ShimFile`] is the sum over the two kinds of handle the shim hands out:
//! a plain pass-through to the host backend, or a [`ZnsWalFile`] that
//! buffers WAL traffic in front of a zone file. Every per-file operation
//! dispatches with a single `match`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use super::buffer::WriteBuffer;
use crate::vfs::{ControlOp, DeviceCaps, LockLevel, SyncMode, VfsFile, VfsResult};
use crate::zone::{reset_zone, ZoneManager};

/// A WAL handle backed by a zone file.
///
/// Writes land in the in-memory buffer; `sync` flushes them to the zone in
/// one sequential append and then syncs the host handle. The reported file
/// size is the buffered logical size, so the engine sees an ordinary file.
#[derive(Debug)]
pub struct ZnsWalFile<F: VfsFile> {
    inner: F,
    zone_path: PathBuf,
    buffer: WriteBuffer,
    manager: Arc<ZoneManager>,
    released: bool,
}

impl<F: VfsFile> ZnsWalFile<F> {
    pub(crate) fn new(
        inner: F,
        zone_path: PathBuf,
        physical_size: u64,
        manager: Arc<ZoneManager>,
    ) -> Self {
        Self {
            inner,
            zone_path,
            buffer: WriteBuffer::with_physical_size(physical_size),
            manager,
            released: false,
        }
    }

    /// Zone file backing this WAL
    pub fn zone_path(&self) -> &Path {
        &self.zone_path
    }

    fn release_zone(&mut self) {
        if !self.released {
            self.released = true;
            self.manager.release(&self.zone_path);
        }
    }
}

impl<F: VfsFile> VfsFile for ZnsWalFile<F> {
    fn close(&mut self) -> VfsResult<()> {
        self.buffer.release();
        self.release_zone();
        self.inner.close()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        self.inner.read_at(buf, offset)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> VfsResult<()> {
        self.buffer.write(data, offset)
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        if size > 0 {
            // A zone is only resettable as a whole; the engine re-extends
            // the WAL through ordinary appends afterwards
            warn!(
                zone = %self.zone_path.display(),
                size,
                "ignoring truncate of a zone-backed WAL to a non-zero size"
            );
            return Ok(());
        }
        self.buffer.clear();
        reset_zone(&self.zone_path)?;
        Ok(())
    }

    fn sync(&mut self, mode: SyncMode) -> VfsResult<()> {
        let Self { buffer, inner, .. } = self;
        buffer.flush(|bytes, offset| inner.write_at(bytes, offset))?;
        inner.sync(mode)
    }

    fn file_size(&self) -> VfsResult<u64> {
        Ok(self.buffer.logical_size())
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.inner.lock(level)
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.inner.unlock(level)
    }

    fn check_reserved_lock(&self) -> VfsResult<bool> {
        self.inner.check_reserved_lock()
    }

    fn file_control(&mut self, op: ControlOp) -> VfsResult<()> {
        self.inner.file_control(op)
    }

    fn sector_size(&self) -> u32 {
        self.inner.sector_size()
    }

    fn device_characteristics(&self) -> DeviceCaps {
        // The buffer hides the sequential-write constraint, so no extra
        // capabilities are advertised on top of the host backend's
        self.inner.device_characteristics()
    }

    fn shm_map(&mut self, region: u32, region_size: u32, extend: bool) -> VfsResult<()> {
        self.inner.shm_map(region, region_size, extend)
    }

    fn shm_lock(&mut self, offset: u32, count: u32, exclusive: bool) -> VfsResult<()> {
        self.inner.shm_lock(offset, count, exclusive)
    }

    fn shm_barrier(&self) {
        self.inner.shm_barrier()
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        self.inner.shm_unmap(delete)
    }

    fn fetch(&self, offset: u64, amount: usize) -> VfsResult<Option<Vec<u8>>> {
        self.inner.fetch(offset, amount)
    }

    fn unfetch(&mut self, offset: u64) -> VfsResult<()> {
        self.inner.unfetch(offset)
    }
}

impl<F: VfsFile> Drop for ZnsWalFile<F> {
    fn drop(&mut self) {
        // Handles dropped without close still give their zone back
        self.release_zone();
    }
}

/// Open handle returned by [`super::ZnsVfs::open`]
#[derive(Debug)]
pub enum ShimFile<F: VfsFile> {
    /// Ordinary file, every operation delegated to the host backend
    PassThrough(F),
    /// Zone-backed WAL with the buffered-write engine in front
    ZnsWal(ZnsWalFile<F>),
}

impl<F: VfsFile> ShimFile<F> {
    /// True when this handle buffers onto a zone file
    pub fn is_zns_wal(&self) -> bool {
        matches!(self, Self::ZnsWal(_))
    }
}

impl<F: VfsFile> VfsFile for ShimFile<F> {
    fn close(&mut self) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.close(),
            Self::ZnsWal(f) => f.close(),
        }
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        match self {
            Self::PassThrough(f) => f.read_at(buf, offset),
            Self::ZnsWal(f) => f.read_at(buf, offset),
        }
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.write_at(data, offset),
            Self::ZnsWal(f) => f.write_at(data, offset),
        }
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.truncate(size),
            Self::ZnsWal(f) => f.truncate(size),
        }
    }

    fn sync(&mut self, mode: SyncMode) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.sync(mode),
            Self::ZnsWal(f) => f.sync(mode),
        }
    }

    fn file_size(&self) -> VfsResult<u64> {
        match self {
            Self::PassThrough(f) => f.file_size(),
            Self::ZnsWal(f) => f.file_size(),
        }
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.lock(level),
            Self::ZnsWal(f) => f.lock(level),
        }
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.unlock(level),
            Self::ZnsWal(f) => f.unlock(level),
        }
    }

    fn check_reserved_lock(&self) -> VfsResult<bool> {
        match self {
            Self::PassThrough(f) => f.check_reserved_lock(),
            Self::ZnsWal(f) => f.check_reserved_lock(),
        }
    }

    fn file_control(&mut self, op: ControlOp) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.file_control(op),
            Self::ZnsWal(f) => f.file_control(op),
        }
    }

    fn sector_size(&self) -> u32 {
        match self {
            Self::PassThrough(f) => f.sector_size(),
            Self::ZnsWal(f) => f.sector_size(),
        }
    }

    fn device_characteristics(&self) -> DeviceCaps {
        match self {
            Self::PassThrough(f) => f.device_characteristics(),
            Self::ZnsWal(f) => f.device_characteristics(),
        }
    }

    fn shm_map(&mut self, region: u32, region_size: u32, extend: bool) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.shm_map(region, region_size, extend),
            Self::ZnsWal(f) => f.shm_map(region, region_size, extend),
        }
    }

    fn shm_lock(&mut self, offset: u32, count: u32, exclusive: bool) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.shm_lock(offset, count, exclusive),
            Self::ZnsWal(f) => f.shm_lock(offset, count, exclusive),
        }
    }

    fn shm_barrier(&self) {
        match self {
            Self::PassThrough(f) => f.shm_barrier(),
            Self::ZnsWal(f) => f.shm_barrier(),
        }
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.shm_unmap(delete),
            Self::ZnsWal(f) => f.shm_unmap(delete),
        }
    }

    fn fetch(&self, offset: u64, amount: usize) -> VfsResult<Option<Vec<u8>>> {
        match self {
            Self::PassThrough(f) => f.fetch(offset, amount),
            Self::ZnsWal(f) => f.fetch(offset, amount),
        }
    }

    fn unfetch(&mut self, offset: u64) -> VfsResult<()> {
        match self {
            Self::PassThrough(f) => f.unfetch(offset),
            Self::ZnsWal(f) => f.unfetch(offset),
        }
    }
}
