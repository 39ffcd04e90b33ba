//! Host OS backend for Unix platforms
//!
//! This is the real backend the ZNS shim wraps: plain positioned IO through
//! the filesystem plus whole-file POSIX advisory locks. Zone files opened by
//! the shim also go through here, so everything a zonefs mount exposes as a
//! regular file is reachable with no special casing.

use std::ffi::{CStr, CString};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;

use super::error::{VfsError, VfsResult};
use super::traits::{
    AccessCheck, ControlOp, DeviceCaps, DlHandle, DlSymbol, LockLevel, OpenFlags, SyncMode, Vfs,
    VfsFile, DEFAULT_SECTOR_SIZE,
};

/// Julian Day number of the Unix epoch
const JULIAN_UNIX_EPOCH: f64 = 2_440_587.5;

/// Unix epoch expressed in Julian Day milliseconds
const JULIAN_UNIX_EPOCH_MS: i64 = 210_866_760_000_000;

/// The host backend
pub struct UnixVfs;

/// A file opened through [`UnixVfs`]
#[derive(Debug)]
pub struct UnixFile {
    file: File,
    path: PathBuf,
    lock_level: LockLevel,
    delete_on_close: bool,
}

fn open_with(path: &Path, flags: OpenFlags, writable: bool) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true);
    if writable {
        opts.write(true);
    }
    if flags.contains(OpenFlags::CREATE) {
        if flags.contains(OpenFlags::EXCLUSIVE) {
            opts.create_new(true);
        } else {
            opts.create(true);
        }
    }
    opts.open(path)
}

impl Vfs for UnixVfs {
    type File = UnixFile;

    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<(UnixFile, OpenFlags)> {
        let mut out_flags = flags;
        let writable = flags.contains(OpenFlags::READ_WRITE);

        let file = match open_with(path, flags, writable) {
            Ok(f) => f,
            Err(e) if writable && e.kind() == ErrorKind::PermissionDenied => {
                // Read-only media or permissions: fall back and report it
                out_flags.remove(OpenFlags::READ_WRITE);
                out_flags.insert(OpenFlags::READ_ONLY);
                open_with(path, flags, false)?
            }
            Err(e) => return Err(e.into()),
        };

        Ok((
            UnixFile {
                file,
                path: path.to_path_buf(),
                lock_level: LockLevel::Unlocked,
                delete_on_close: flags.contains(OpenFlags::DELETE_ON_CLOSE),
            },
            out_flags,
        ))
    }

    fn delete(&self, path: &Path, sync_dir: bool) -> VfsResult<()> {
        std::fs::remove_file(path)?;
        if sync_dir {
            if let Some(dir) = path.parent() {
                File::open(dir)?.sync_all()?;
            }
        }
        Ok(())
    }

    fn access(&self, path: &Path, check: AccessCheck) -> VfsResult<bool> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(match check {
                AccessCheck::Exists | AccessCheck::Read => true,
                AccessCheck::ReadWrite => !meta.permissions().readonly(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn full_pathname(&self, path: &Path) -> VfsResult<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }

    fn randomness(&self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }

    fn sleep(&self, duration: Duration) -> Duration {
        std::thread::sleep(duration);
        duration
    }

    fn current_time(&self) -> VfsResult<f64> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VfsError::Io(std::io::Error::other(e.to_string())))?;
        Ok(JULIAN_UNIX_EPOCH + now.as_secs_f64() / 86_400.0)
    }

    fn current_time_millis(&self) -> VfsResult<i64> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VfsError::Io(std::io::Error::other(e.to_string())))?;
        Ok(JULIAN_UNIX_EPOCH_MS + now.as_millis() as i64)
    }

    fn last_error(&self) -> Option<(i32, String)> {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code != 0 => Some((code, err.to_string())),
            _ => None,
        }
    }

    fn dl_open(&self, path: &Path) -> Option<DlHandle> {
        let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
        // SAFETY: c_path is a valid NUL-terminated string for the call
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if handle.is_null() {
            None
        } else {
            Some(DlHandle(handle))
        }
    }

    fn dl_error(&self) -> Option<String> {
        // SAFETY: dlerror returns a thread-local NUL-terminated string or null
        let msg = unsafe { libc::dlerror() };
        if msg.is_null() {
            None
        } else {
            // SAFETY: non-null result points at a valid C string
            Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned())
        }
    }

    fn dl_sym(&self, handle: &DlHandle, symbol: &str) -> Option<DlSymbol> {
        let c_symbol = CString::new(symbol).ok()?;
        // SAFETY: handle.0 came from dlopen and c_symbol is NUL-terminated
        let sym = unsafe { libc::dlsym(handle.0, c_symbol.as_ptr()) };
        if sym.is_null() {
            None
        } else {
            Some(sym)
        }
    }

    fn dl_close(&self, handle: DlHandle) {
        // SAFETY: handle.0 came from dlopen and is closed exactly once
        unsafe {
            libc::dlclose(handle.0);
        }
    }
}

impl UnixFile {
    /// Path this handle was opened against
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set_posix_lock(&self, lock_type: libc::c_short) -> VfsResult<()> {
        // SAFETY: flock is plain data; fcntl only reads it during the call
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = lock_type;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        // l_start = 0, l_len = 0: the whole file
        let rc = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_SETLK, &mut fl) };
        if rc == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }
}

impl VfsFile for UnixFile {
    fn close(&mut self) -> VfsResult<()> {
        if self.delete_on_close {
            self.delete_on_close = false;
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.file.read_at(&mut buf[total..], offset + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> VfsResult<()> {
        self.file.write_all_at(data, offset)?;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.file.set_len(size)?;
        Ok(())
    }

    fn sync(&mut self, mode: SyncMode) -> VfsResult<()> {
        match mode {
            SyncMode::Normal => self.file.sync_data()?,
            SyncMode::Full => self.file.sync_all()?,
        }
        Ok(())
    }

    fn file_size(&self) -> VfsResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        if level <= self.lock_level {
            return Ok(());
        }
        let lock_type = if level == LockLevel::Shared {
            libc::F_RDLCK as libc::c_short
        } else {
            libc::F_WRLCK as libc::c_short
        };
        self.set_posix_lock(lock_type)?;
        self.lock_level = level;
        Ok(())
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        if level >= self.lock_level {
            return Ok(());
        }
        let lock_type = match level {
            LockLevel::Unlocked => libc::F_UNLCK as libc::c_short,
            LockLevel::Shared => libc::F_RDLCK as libc::c_short,
            _ => return Err(VfsError::Misuse("unlock target above shared")),
        };
        self.set_posix_lock(lock_type)?;
        self.lock_level = level;
        Ok(())
    }

    fn check_reserved_lock(&self) -> VfsResult<bool> {
        if self.lock_level >= LockLevel::Reserved {
            return Ok(true);
        }
        // SAFETY: flock is plain data; F_GETLK fills it in during the call
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = libc::F_WRLCK as libc::c_short;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        let rc = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_GETLK, &mut fl) };
        if rc == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(fl.l_type != libc::F_UNLCK as libc::c_short)
    }

    fn file_control(&mut self, op: ControlOp) -> VfsResult<()> {
        match op {
            // Advisory only; the filesystem extends the file as writes land
            ControlOp::SizeHint(_) => Ok(()),
            ControlOp::Raw(_) => Err(VfsError::NotSupported("file_control")),
        }
    }

    fn sector_size(&self) -> u32 {
        DEFAULT_SECTOR_SIZE
    }

    fn device_characteristics(&self) -> DeviceCaps {
        DeviceCaps::empty()
    }
}

impl Drop for UnixFile {
    fn drop(&mut self) {
        if self.delete_on_close {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
