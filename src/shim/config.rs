//! ZNS mode configuration gate
//!
//! One structure, one mutex: the gate owns the enabled/disabled switch, the
//! active zone root, and the zone registry discovered under it. Open
//! handles keep their own `Arc` of the registry that allocated their zone,
//! so disabling or re-pointing the gate never strands a release.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::zone::{ZoneError, ZoneManager, ZoneResult};

struct ZnsState {
    root: PathBuf,
    manager: Arc<ZoneManager>,
}

/// Switch and registry holder for ZNS WAL mode
pub struct ZnsGate {
    state: Mutex<Option<ZnsState>>,
}

impl ZnsGate {
    /// A disabled gate
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Enable ZNS WAL mode against `root`.
    ///
    /// `root` must be an existing directory. Enabling against the already
    /// active root is a no-op; a different root tears the current registry
    /// down and discovers the new one. When discovery fails the gate stays
    /// disabled and the error is returned.
    pub fn enable(&self, root: &Path) -> ZoneResult<()> {
        let meta = std::fs::metadata(root).map_err(|source| ZoneError::CannotOpen {
            path: root.to_path_buf(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ZoneError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        let mut state = self.state.lock();
        if let Some(current) = state.as_ref() {
            if current.root == root {
                return Ok(());
            }
        }

        *state = None;
        let manager = ZoneManager::discover(root)?;
        info!(root = %root.display(), zones = manager.zone_count(), "ZNS WAL mode enabled");
        *state = Some(ZnsState {
            root: root.to_path_buf(),
            manager: Arc::new(manager),
        });
        Ok(())
    }

    /// Disable ZNS WAL mode and drop the registry
    pub fn disable(&self) {
        let mut state = self.state.lock();
        if state.take().is_some() {
            debug!("ZNS WAL mode disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Active zone root, when enabled
    pub fn root(&self) -> Option<PathBuf> {
        self.state.lock().as_ref().map(|s| s.root.clone())
    }

    /// Registry for the active root, when enabled
    pub fn manager(&self) -> Option<Arc<ZoneManager>> {
        self.state.lock().as_ref().map(|s| Arc::clone(&s.manager))
    }
}

impl Default for ZnsGate {
    fn default() -> Self {
        Self::new()
    }
}
