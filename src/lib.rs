//! zonewal - a ZNS storage backend shim for an embedded SQL engine's WAL
//!
//! Features:
//! - Zone-per-file discovery and allocation over a zonefs mount
//! - In-memory write coalescing that turns the engine's random-offset WAL
//!   writes into strictly sequential zone appends
//! - Hardware zone resets behind the engine's truncate and delete semantics

pub mod shim;
pub mod vfs;
pub mod zone;
