//! Integration tests for the ZNS WAL shim
//!
//! These drive the shim the way the engine does: open with the WAL flag,
//! random-offset writes, sync, truncate, delete, and close, observing both
//! the engine-visible behavior and the zone files on disk.

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;
use zonewal::shim::ZnsVfs;
use zonewal::vfs::{AccessCheck, OpenFlags, SyncMode, Vfs, VfsError, VfsFile};
use zonewal::zone::ZoneError;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Zone root populated with `zones` empty zone files, zonefs-style
fn zone_root(name: &str, zones: usize) -> PathBuf {
    let mut root = std::env::temp_dir();
    root.push(format!("zonewal_shim_zones_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();
    for i in 0..zones {
        std::fs::write(root.join(format!("{i:04x}")), b"").unwrap();
    }
    root
}

/// Directory standing in for wherever the engine keeps its database
fn db_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("zonewal_shim_db_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(paths: &[&PathBuf]) {
    for path in paths {
        let _ = std::fs::remove_dir_all(path);
    }
}

fn wal_open_flags() -> OpenFlags {
    OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::WAL
}

#[test]
fn buffered_write_sequence_flushes_merged_bytes() {
    init_logging();
    let root = zone_root("buffered", 2);
    let db = db_dir("buffered");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();
    assert!(file.is_zns_wal());
    // The WAL was redirected onto a zone; nothing appears at the engine path
    assert!(!wal_path.exists());

    file.write_at(&[0xaa; 32], 0).unwrap();
    file.write_at(&[0xbb; 8], 24).unwrap();
    assert_eq!(file.file_size().unwrap(), 32);

    // Nothing hits the zone until sync
    let zone = root.join("0000");
    assert_eq!(std::fs::metadata(&zone).unwrap().len(), 0);

    file.sync(SyncMode::Full).unwrap();
    let on_disk = std::fs::read(&zone).unwrap();
    assert_eq!(on_disk.len(), 32);
    assert_eq!(&on_disk[..24], &[0xaa; 24]);
    assert_eq!(&on_disk[24..], &[0xbb; 8]);

    file.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn gap_writes_are_rejected_and_overwrites_accepted() {
    let root = zone_root("gaps", 1);
    let db = db_dir("gaps");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();
    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();

    file.write_at(&[1u8; 16], 0).unwrap();

    // One past the logical size is a hole
    let err = file.write_at(&[2u8; 4], 17).unwrap_err();
    assert!(matches!(err, VfsError::WriteGap { offset: 17, size: 16 }));

    // Exactly at the logical size appends; offset zero overwrites
    file.write_at(&[2u8; 4], 16).unwrap();
    file.write_at(&[3u8; 4], 0).unwrap();
    assert_eq!(file.file_size().unwrap(), 20);

    file.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn reads_reflect_only_flushed_bytes() {
    let root = zone_root("reads", 1);
    let db = db_dir("reads");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();
    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();

    file.write_at(&[7u8; 24], 0).unwrap();

    // Reads delegate to the zone file, which is still empty before sync
    let mut buf = [0u8; 24];
    assert_eq!(file.read_at(&mut buf, 0).unwrap(), 0);

    file.sync(SyncMode::Normal).unwrap();
    assert_eq!(file.read_at(&mut buf, 0).unwrap(), 24);
    assert_eq!(buf, [7u8; 24]);

    file.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn truncate_zero_resets_the_zone_and_keeps_the_mapping() {
    init_logging();
    let root = zone_root("truncate", 1);
    let db = db_dir("truncate");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();
    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();

    file.write_at(&[0xcc; 48], 0).unwrap();
    file.sync(SyncMode::Full).unwrap();
    let zone = root.join("0000");
    assert_eq!(std::fs::metadata(&zone).unwrap().len(), 48);

    file.truncate(0).unwrap();
    assert_eq!(file.file_size().unwrap(), 0);
    assert_eq!(std::fs::metadata(&zone).unwrap().len(), 0);

    // The zone stays mapped to the same WAL
    let manager = vfs.gate().manager().unwrap();
    assert_eq!(manager.lookup("main.db-wal").unwrap(), zone);

    // Truncate(0) is idempotent
    file.truncate(0).unwrap();
    assert_eq!(file.file_size().unwrap(), 0);

    // The engine re-establishes state through ordinary appends
    file.write_at(&[0xdd; 16], 0).unwrap();
    file.sync(SyncMode::Full).unwrap();
    assert_eq!(std::fs::read(&zone).unwrap(), vec![0xdd; 16]);

    file.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn truncate_to_nonzero_size_is_a_warned_noop() {
    let root = zone_root("truncate_nz", 1);
    let db = db_dir("truncate_nz");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();
    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();

    file.write_at(&[1u8; 64], 0).unwrap();
    file.sync(SyncMode::Full).unwrap();

    file.truncate(32).unwrap();
    assert_eq!(file.file_size().unwrap(), 64);
    assert_eq!(std::fs::metadata(root.join("0000")).unwrap().len(), 64);

    file.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn delete_clears_the_mapping_and_resets_the_zone() {
    init_logging();
    let root = zone_root("delete", 2);
    let db = db_dir("delete");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();
    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();

    file.write_at(&[0xee; 40], 0).unwrap();
    file.sync(SyncMode::Full).unwrap();
    let zone = root.join("0000");

    vfs.delete(&wal_path, false).unwrap();

    // The logical file is gone and the zone is free and empty
    assert!(!vfs.access(&wal_path, AccessCheck::Exists).unwrap());
    let manager = vfs.gate().manager().unwrap();
    assert!(manager.lookup("main.db-wal").is_none());
    assert_eq!(manager.free_count(), 2);
    assert_eq!(std::fs::metadata(&zone).unwrap().len(), 0);

    // Closing the stale handle afterwards is harmless (double release warns)
    file.close().unwrap();

    // A fresh open re-acquires a free zone
    let (mut reopened, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();
    assert_eq!(reopened.file_size().unwrap(), 0);
    reopened.close().unwrap();

    cleanup(&[&root, &db]);
}

#[test]
fn open_close_open_round_trip_keeps_synced_bytes() {
    let root = zone_root("round_trip", 1);
    let db = db_dir("round_trip");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    {
        let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();
        file.write_at(&[0x11; 32], 0).unwrap();
        file.sync(SyncMode::Full).unwrap();
        // Buffered but unsynced tail is not part of the durable image
        file.write_at(&[0x22; 8], 32).unwrap();
        file.close().unwrap();
    }

    let (file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();
    assert_eq!(file.file_size().unwrap(), 32);

    let mut file = file;
    file.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn exhaustion_when_every_zone_is_allocated() {
    let root = zone_root("exhaustion", 1);
    let db = db_dir("exhaustion");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    let (mut first, _) = vfs.open(&db.join("a-wal"), wal_open_flags()).unwrap();

    let err = vfs.open(&db.join("b-wal"), wal_open_flags()).unwrap_err();
    assert!(matches!(err, VfsError::ZonesExhausted));

    first.close().unwrap();

    // The zone freed by close satisfies the next WAL
    let (mut second, _) = vfs.open(&db.join("b-wal"), wal_open_flags()).unwrap();
    second.close().unwrap();

    cleanup(&[&root, &db]);
}

#[test]
fn failed_zone_open_releases_the_allocation() {
    let root = zone_root("open_failure", 1);
    let db = db_dir("open_failure");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    // Pull the zone file out from under the registry; CREATE is stripped on
    // zone opens, so the open must fail instead of creating it
    std::fs::remove_file(root.join("0000")).unwrap();

    assert!(vfs.open(&db.join("a-wal"), wal_open_flags()).is_err());
    assert!(!root.join("0000").exists());
    assert_eq!(vfs.gate().manager().unwrap().free_count(), 1);

    cleanup(&[&root, &db]);
}

#[test]
fn access_resolves_through_the_zone_mapping() {
    let root = zone_root("access", 1);
    let db = db_dir("access");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    // No mapping yet: the WAL does not exist in the zone namespace
    assert!(!vfs.access(&wal_path, AccessCheck::Exists).unwrap());

    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();
    assert!(vfs.access(&wal_path, AccessCheck::Exists).unwrap());
    assert!(vfs.access(&wal_path, AccessCheck::ReadWrite).unwrap());

    file.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn non_wal_files_pass_through() {
    let root = zone_root("passthrough", 1);
    let db = db_dir("passthrough");
    let db_path = db.join("main.db");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    let (mut file, _) = vfs
        .open(&db_path, OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::MAIN_DB)
        .unwrap();
    assert!(!file.is_zns_wal());
    file.write_at(b"page one", 0).unwrap();
    file.sync(SyncMode::Full).unwrap();
    file.close().unwrap();

    // The database landed at its real path, not in the zone namespace
    assert_eq!(std::fs::read(&db_path).unwrap(), b"page one");
    assert_eq!(std::fs::metadata(root.join("0000")).unwrap().len(), 0);

    cleanup(&[&root, &db]);
}

#[test]
fn disabled_gate_passes_wal_files_through() {
    let db = db_dir("disabled");
    let wal_path = db.join("main.db-wal");

    let vfs = ZnsVfs::wrapping_unix();

    let (mut file, _) = vfs.open(&wal_path, wal_open_flags()).unwrap();
    assert!(!file.is_zns_wal());
    file.write_at(&[9u8; 12], 0).unwrap();
    file.sync(SyncMode::Full).unwrap();
    file.close().unwrap();

    // With the gate disabled the WAL is an ordinary file
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 12);
    assert!(vfs.access(&wal_path, AccessCheck::Exists).unwrap());
    vfs.delete(&wal_path, false).unwrap();
    assert!(!wal_path.exists());

    cleanup(&[&db]);
}

#[test]
fn unmapped_wal_delete_passes_through() {
    let root = zone_root("unmapped_delete", 1);
    let db = db_dir("unmapped_delete");
    let wal_path = db.join("stale.db-wal");

    // A leftover WAL on the ordinary filesystem, never mapped to a zone
    std::fs::write(&wal_path, b"leftover").unwrap();

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    vfs.delete(&wal_path, false).unwrap();
    assert!(!wal_path.exists());

    cleanup(&[&root, &db]);
}

#[test]
fn concurrent_wals_get_independent_zones_and_buffers() {
    let root = zone_root("two_wals", 2);
    let db = db_dir("two_wals");

    let vfs = ZnsVfs::wrapping_unix();
    vfs.enable_zns_wal(Some(&root)).unwrap();

    let (mut first, _) = vfs.open(&db.join("one.db-wal"), wal_open_flags()).unwrap();
    let (mut second, _) = vfs.open(&db.join("two.db-wal"), wal_open_flags()).unwrap();

    first.write_at(&[0x01; 16], 0).unwrap();
    second.write_at(&[0x02; 24], 0).unwrap();
    first.sync(SyncMode::Full).unwrap();
    second.sync(SyncMode::Full).unwrap();

    assert_eq!(std::fs::read(root.join("0000")).unwrap(), vec![0x01; 16]);
    assert_eq!(std::fs::read(root.join("0001")).unwrap(), vec![0x02; 24]);

    first.close().unwrap();
    second.close().unwrap();
    cleanup(&[&root, &db]);
}

#[test]
fn gate_transitions() {
    let root_a = zone_root("gate_a", 1);
    let root_b = zone_root("gate_b", 2);
    let db = db_dir("gate");

    let vfs = ZnsVfs::wrapping_unix();
    assert!(!vfs.gate().is_enabled());

    // A file is not a valid zone root
    let plain = db.join("plain");
    std::fs::write(&plain, b"").unwrap();
    let err = vfs.enable_zns_wal(Some(&plain)).unwrap_err();
    assert!(matches!(err, VfsError::Zone(ZoneError::NotADirectory { .. })));
    assert!(!vfs.gate().is_enabled());

    // A missing path cannot be opened
    let missing = db.join("missing");
    let err = vfs.enable_zns_wal(Some(&missing)).unwrap_err();
    assert!(matches!(err, VfsError::Zone(ZoneError::CannotOpen { .. })));

    vfs.enable_zns_wal(Some(&root_a)).unwrap();
    assert_eq!(vfs.gate().manager().unwrap().zone_count(), 1);

    // Re-pointing re-discovers
    vfs.enable_zns_wal(Some(&root_b)).unwrap();
    assert_eq!(vfs.gate().manager().unwrap().zone_count(), 2);

    // None and the empty path both disable
    vfs.enable_zns_wal(Some(Path::new(""))).unwrap();
    assert!(!vfs.gate().is_enabled());
    vfs.enable_zns_wal(Some(&root_a)).unwrap();
    vfs.enable_zns_wal(None).unwrap();
    assert!(!vfs.gate().is_enabled());

    cleanup(&[&root_a, &root_b, &db]);
}
