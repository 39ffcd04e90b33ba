//! Zone write-pointer reset
//!
//! A zone cannot be partially truncated; reclaiming its space means moving
//! the write pointer back to the start, discarding everything. The block
//! layer exposes that as the `BLKRESETZONE` ioctl.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::debug;

use super::error::{ZoneError, ZoneResult};

/// Range argument for `BLKRESETZONE`. Zeroed sector and count select the
/// zone backing the file.
#[cfg(target_os = "linux")]
#[repr(C)]
struct BlkZoneRange {
    sector: u64,
    nr_sectors: u64,
}

/// `_IOW(0x12, 103, struct blk_zone_range)`.
///
/// libc does not export this request number; whether the encoding matches a
/// given kernel is a porting concern.
#[cfg(target_os = "linux")]
const BLKRESETZONE: libc::c_ulong = 0x4010_1267;

/// Move the write pointer of the zone at `path` back to zero.
///
/// Issues the block-layer reset ioctl first. When the descriptor turns out
/// not to be backed by a zoned block device, falls back to truncation to
/// zero, which zonefs defines as the reset operation on sequential zone
/// files (and which gives plain files the same observable effect).
pub fn reset_zone(path: &Path) -> ZoneResult<()> {
    let fail = |source: std::io::Error| ZoneError::ResetFailed {
        path: path.to_path_buf(),
        source,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(fail)?;

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let range = BlkZoneRange {
            sector: 0,
            nr_sectors: 0,
        };
        // SAFETY: the fd is open for writing and `range` outlives the call
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKRESETZONE, &range) };
        if rc == 0 {
            debug!(zone = %path.display(), "zone reset via BLKRESETZONE");
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            // Not a zoned block device: take the truncation path below
            Some(libc::ENOTTY) | Some(libc::EINVAL) | Some(libc::EOPNOTSUPP) => {}
            _ => return Err(fail(err)),
        }
    }

    file.set_len(0).map_err(fail)?;
    file.sync_all().map_err(fail)?;
    debug!(zone = %path.display(), "zone reset via truncation");
    Ok(())
}
