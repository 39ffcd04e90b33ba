//! The interceptor backend
//!
//! [`ZnsVfs`] wraps a host backend and classifies every incoming operation.
//! WAL opens (flagged by the engine) are remapped onto zone files from the
//! registry; WAL deletes and access checks (recognized by the `-wal`
//! suffix) resolve through the name-to-zone mapping. Everything else passes
//! through untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::config::ZnsGate;
use super::file::{ShimFile, ZnsWalFile};
use crate::vfs::{
    AccessCheck, DlHandle, DlSymbol, OpenFlags, Vfs, VfsError, VfsFile, VfsResult,
};
use crate::zone::reset_zone;

/// Storage backend that redirects WAL files onto a zone namespace
pub struct ZnsVfs<V: Vfs> {
    inner: V,
    gate: Arc<ZnsGate>,
}

/// True for a non-empty file name ending in the `-wal` suffix,
/// case-insensitively. Deletes and access checks classify by suffix; opens
/// classify by the WAL open flag instead.
fn has_wal_suffix(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.len() >= 4 && name.as_bytes()[name.len() - 4..].eq_ignore_ascii_case(b"-wal")
}

fn wal_base_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

impl<V: Vfs> ZnsVfs<V> {
    /// Wrap `inner`; the gate starts disabled, so every operation passes
    /// through until [`ZnsVfs::enable_zns_wal`] points it at a zone root.
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            gate: Arc::new(ZnsGate::new()),
        }
    }

    /// Configuration entry point.
    ///
    /// `None` (or an empty path) disables ZNS WAL mode and tears down the
    /// zone registry. A non-empty path must name an existing directory; it
    /// becomes the zone root and its zones are discovered, re-initializing
    /// when the root changes.
    pub fn enable_zns_wal(&self, root: Option<&Path>) -> VfsResult<()> {
        match root {
            None => {
                self.gate.disable();
                Ok(())
            }
            Some(path) if path.as_os_str().is_empty() => {
                self.gate.disable();
                Ok(())
            }
            Some(path) => {
                self.gate.enable(path)?;
                Ok(())
            }
        }
    }

    /// The configuration gate, for inspection
    pub fn gate(&self) -> &ZnsGate {
        &self.gate
    }

    /// The wrapped host backend
    pub fn inner(&self) -> &V {
        &self.inner
    }
}

#[cfg(unix)]
impl ZnsVfs<crate::vfs::UnixVfs> {
    /// The shim over the host OS backend; the usual deployment
    pub fn wrapping_unix() -> Self {
        Self::new(crate::vfs::UnixVfs)
    }
}

impl<V: Vfs> Vfs for ZnsVfs<V> {
    type File = ShimFile<V::File>;

    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<(Self::File, OpenFlags)> {
        if flags.contains(OpenFlags::WAL) && !path.as_os_str().is_empty() {
            if let Some(manager) = self.gate.manager() {
                let Some(wal_name) = wal_base_name(path) else {
                    return Err(VfsError::Misuse("WAL path has no file name"));
                };
                let Some(zone_path) = manager.acquire(wal_name) else {
                    return Err(VfsError::ZonesExhausted);
                };

                // Zone files pre-exist and are never auto-deleted
                let zone_flags = flags - (OpenFlags::CREATE | OpenFlags::DELETE_ON_CLOSE);
                let (file, out_flags) = match self.inner.open(&zone_path, zone_flags) {
                    Ok(opened) => opened,
                    Err(e) => {
                        manager.release(&zone_path);
                        return Err(e);
                    }
                };

                let physical = match file.file_size() {
                    Ok(size) => size,
                    Err(e) => {
                        let mut file = file;
                        let _ = file.close();
                        manager.release(&zone_path);
                        return Err(e);
                    }
                };

                debug!(
                    wal = wal_name,
                    zone = %zone_path.display(),
                    physical,
                    "opened zone-backed WAL"
                );
                let handle = ZnsWalFile::new(file, zone_path, physical, manager);
                return Ok((ShimFile::ZnsWal(handle), out_flags));
            }
        }

        let (file, out_flags) = self.inner.open(path, flags)?;
        Ok((ShimFile::PassThrough(file), out_flags))
    }

    fn delete(&self, path: &Path, sync_dir: bool) -> VfsResult<()> {
        if has_wal_suffix(path) {
            if let (Some(manager), Some(wal_name)) = (self.gate.manager(), wal_base_name(path)) {
                if let Some(zone_path) = manager.lookup(wal_name) {
                    // The mapping is the logical file; a failed hardware
                    // reset still leaves the WAL deleted
                    if let Err(e) = reset_zone(&zone_path) {
                        warn!(
                            zone = %zone_path.display(),
                            error = %e,
                            "zone reset failed during WAL delete"
                        );
                    }
                    manager.release(&zone_path);
                    return Ok(());
                }
            }
        }
        self.inner.delete(path, sync_dir)
    }

    fn access(&self, path: &Path, check: AccessCheck) -> VfsResult<bool> {
        if has_wal_suffix(path) {
            if let (Some(manager), Some(wal_name)) = (self.gate.manager(), wal_base_name(path)) {
                return match manager.lookup(wal_name) {
                    Some(zone_path) => self.inner.access(&zone_path, check),
                    // No mapping: the WAL does not exist in the zone namespace
                    None => Ok(false),
                };
            }
        }
        self.inner.access(path, check)
    }

    fn full_pathname(&self, path: &Path) -> VfsResult<PathBuf> {
        self.inner.full_pathname(path)
    }

    fn randomness(&self, buf: &mut [u8]) {
        self.inner.randomness(buf)
    }

    fn sleep(&self, duration: Duration) -> Duration {
        self.inner.sleep(duration)
    }

    fn current_time(&self) -> VfsResult<f64> {
        self.inner.current_time()
    }

    fn current_time_millis(&self) -> VfsResult<i64> {
        self.inner.current_time_millis()
    }

    fn last_error(&self) -> Option<(i32, String)> {
        self.inner.last_error()
    }

    fn dl_open(&self, path: &Path) -> Option<DlHandle> {
        self.inner.dl_open(path)
    }

    fn dl_error(&self) -> Option<String> {
        self.inner.dl_error()
    }

    fn dl_sym(&self, handle: &DlHandle, symbol: &str) -> Option<DlSymbol> {
        self.inner.dl_sym(handle, symbol)
    }

    fn dl_close(&self, handle: DlHandle) {
        self.inner.dl_close(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_suffix_classification() {
        assert!(has_wal_suffix(Path::new("/data/main.db-wal")));
        assert!(has_wal_suffix(Path::new("main.db-WAL")));
        assert!(has_wal_suffix(Path::new("-wal")));

        assert!(!has_wal_suffix(Path::new("/data/main.db")));
        assert!(!has_wal_suffix(Path::new("/data/main.db-shm")));
        assert!(!has_wal_suffix(Path::new("wal")));
        assert!(!has_wal_suffix(Path::new("")));
    }
}
