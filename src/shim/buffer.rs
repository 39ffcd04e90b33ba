//! Write coalescing for zone-backed WAL files
//!
//! A zone only accepts writes at its write pointer, but the engine rewrites
//! WAL header bytes and checksums at earlier offsets before every sync. The
//! buffer absorbs that: random-offset writes land in memory, and flushing
//! emits only the suffix past what is already on the zone, so the write
//! pointer advances monotonically.
//!
//! Bytes below the flushed mark may be rewritten in the buffer but are
//! never re-emitted to the zone. That is safe because the engine rewrites
//! already-synced WAL prefix bytes only when it resets the log, and a reset
//! routes through truncate-to-zero, which discards the buffer with the
//! zone.

use crate::vfs::{VfsError, VfsResult};

/// Smallest allocation for a fresh buffer
const BUFFER_FLOOR: usize = 4 * 1024;

/// Capacity grows in units of this
const BUFFER_ALIGN: usize = 1024;

/// In-memory image of a WAL's unsynced tail.
///
/// `logical` is the file size the engine sees; `flushed` is the physical
/// size of the zone file, which never exceeds it.
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    data: Vec<u8>,
    logical: u64,
    flushed: u64,
}

impl WriteBuffer {
    /// Track a zone whose physical size is `size`; the allocation is
    /// deferred until the first write.
    pub(crate) fn with_physical_size(size: u64) -> Self {
        Self {
            data: Vec::new(),
            logical: size,
            flushed: size,
        }
    }

    /// File size as seen by the engine
    pub(crate) fn logical_size(&self) -> u64 {
        self.logical
    }

    /// Accept `bytes` at `offset`.
    ///
    /// Offsets up to and including the logical size are valid (overwrites
    /// and appends); anything past it would leave a hole in the WAL image
    /// and is rejected.
    pub(crate) fn write(&mut self, bytes: &[u8], offset: u64) -> VfsResult<()> {
        if offset > self.logical {
            return Err(VfsError::WriteGap {
                offset,
                size: self.logical,
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let start = offset as usize;
        let end = start + bytes.len();
        self.reserve(end);
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);

        if end as u64 > self.logical {
            self.logical = end as u64;
        }
        debug_assert!(self.flushed <= self.logical);
        Ok(())
    }

    fn reserve(&mut self, needed: usize) {
        if self.data.capacity() >= needed {
            return;
        }
        let target = self
            .data
            .capacity()
            .saturating_mul(2)
            .max(needed)
            .max(BUFFER_FLOOR);
        let target = (target + BUFFER_ALIGN - 1) & !(BUFFER_ALIGN - 1);
        self.data.reserve_exact(target - self.data.len());
    }

    /// Emit the unflushed suffix through `write_at` and advance the flushed
    /// mark. On failure the mark stays put and the buffer is untouched, so
    /// the next sync retries the same bytes.
    pub(crate) fn flush<W>(&mut self, mut write_at: W) -> VfsResult<()>
    where
        W: FnMut(&[u8], u64) -> VfsResult<()>,
    {
        if self.flushed == self.logical {
            return Ok(());
        }
        // logical only moves past flushed through write(), which sizes the
        // allocation to cover it
        let (start, end) = (self.flushed as usize, self.logical as usize);
        write_at(&self.data[start..end], self.flushed)?;
        self.flushed = self.logical;
        Ok(())
    }

    /// Forget everything; the zone behind this buffer was reset
    pub(crate) fn clear(&mut self) {
        self.data = Vec::new();
        self.logical = 0;
        self.flushed = 0;
    }

    /// Free the allocation at close
    pub(crate) fn release(&mut self) {
        self.data = Vec::new();
    }
}
