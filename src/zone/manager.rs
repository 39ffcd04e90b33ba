//! Zone registry
//!
//! A zonefs mount exposes each sequential zone of the device as one
//! fixed-size file named by its index (`%04x`: `0000`, `0001`, ...). The
//! registry discovers those files once, then hands them out to WAL base
//! names on demand. The zone set is fixed after discovery; only the
//! name-to-zone mapping mutates, always under the registry mutex.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::{ZoneError, ZoneResult};

/// One discovered zone file and the WAL currently mapped onto it.
///
/// A zone is free exactly when `mapped_wal` is `None`; there is no separate
/// state field to drift out of sync.
#[derive(Debug)]
struct Zone {
    path: PathBuf,
    mapped_wal: Option<String>,
}

/// Registry of zone files under one zonefs root
#[derive(Debug)]
pub struct ZoneManager {
    root: PathBuf,
    zones: Mutex<Vec<Zone>>,
}

/// True for the zonefs sequential-file naming convention: exactly four
/// lowercase hexadecimal digits.
fn is_zone_name(name: &str) -> bool {
    name.len() == 4
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl ZoneManager {
    /// Enumerate zone files under `root`.
    ///
    /// Entries that do not match the naming convention are ignored, as are
    /// non-regular files (unknown file types are accepted; some kernels do
    /// not report a type from the directory stream). Matches are sorted by
    /// name so allocation order is deterministic.
    pub fn discover(root: &Path) -> ZoneResult<Self> {
        let entries = std::fs::read_dir(root).map_err(|source| ZoneError::CannotOpen {
            path: root.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ZoneError::CannotOpen {
                path: root.to_path_buf(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_zone_name(name) {
                continue;
            }
            if let Ok(file_type) = entry.file_type() {
                if !file_type.is_file() {
                    continue;
                }
            }
            paths.push(entry.path());
        }
        paths.sort();

        debug!(root = %root.display(), zones = paths.len(), "discovered zone files");

        let zones = paths
            .into_iter()
            .map(|path| Zone {
                path,
                mapped_wal: None,
            })
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            zones: Mutex::new(zones),
        })
    }

    /// Map `wal_name` onto a zone and return the zone path.
    ///
    /// A name that is already mapped gets its existing zone back (re-open of
    /// a live WAL); otherwise the lowest-index free zone is taken. `None`
    /// means every zone is allocated.
    pub fn acquire(&self, wal_name: &str) -> Option<PathBuf> {
        let mut zones = self.zones.lock();

        if let Some(zone) = zones
            .iter()
            .find(|z| z.mapped_wal.as_deref() == Some(wal_name))
        {
            return Some(zone.path.clone());
        }

        let zone = zones.iter_mut().find(|z| z.mapped_wal.is_none())?;
        zone.mapped_wal = Some(wal_name.to_owned());
        debug!(wal = wal_name, zone = %zone.path.display(), "zone acquired");
        Some(zone.path.clone())
    }

    /// Clear the mapping of the zone at `zone_path`, making it free again.
    ///
    /// Releasing a zone that is already free is a no-op with a warning.
    pub fn release(&self, zone_path: &Path) {
        let mut zones = self.zones.lock();
        match zones.iter_mut().find(|z| z.path == zone_path) {
            Some(zone) => {
                if let Some(wal) = zone.mapped_wal.take() {
                    debug!(zone = %zone_path.display(), wal = %wal, "zone released");
                } else {
                    warn!(zone = %zone_path.display(), "release of a zone that is already free");
                }
            }
            None => {
                warn!(zone = %zone_path.display(), "release of a path outside the zone registry");
            }
        }
    }

    /// Zone currently mapped to `wal_name`, if any
    pub fn lookup(&self, wal_name: &str) -> Option<PathBuf> {
        self.zones
            .lock()
            .iter()
            .find(|z| z.mapped_wal.as_deref() == Some(wal_name))
            .map(|z| z.path.clone())
    }

    /// Root this registry was discovered under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Total number of zones discovered
    pub fn zone_count(&self) -> usize {
        self.zones.lock().len()
    }

    /// Number of zones without a mapped WAL
    pub fn free_count(&self) -> usize {
        self.zones
            .lock()
            .iter()
            .filter(|z| z.mapped_wal.is_none())
            .count()
    }
}
