//! Integration tests for the zone registry and reset driver

use std::path::PathBuf;
use std::sync::Arc;

use zonewal::zone::{reset_zone, ZoneManager};

fn test_root(name: &str, zone_names: &[&str]) -> PathBuf {
    let mut root = std::env::temp_dir();
    root.push(format!("zonewal_zone_test_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();
    for name in zone_names {
        std::fs::write(root.join(name), b"").unwrap();
    }
    root
}

fn cleanup_root(root: &PathBuf) {
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn discovery_reports_all_zones_free() {
    let root = test_root("discovery", &["0000", "0001", "0002"]);
    std::fs::write(root.join("readme.txt"), b"not a zone").unwrap();

    let manager = ZoneManager::discover(&root).unwrap();
    assert_eq!(manager.zone_count(), 3);
    assert_eq!(manager.free_count(), 3);
    assert_eq!(manager.root(), root.as_path());

    cleanup_root(&root);
}

#[test]
fn allocate_then_release_recycles_the_lowest_zone() {
    let root = test_root("alloc_release", &["0000", "0001", "0002"]);
    let manager = ZoneManager::discover(&root).unwrap();

    // First allocation takes the lowest-index zone
    let zone = manager.acquire("main-wal").unwrap();
    assert_eq!(zone, root.join("0000"));

    // Acquiring the same WAL name again is a re-open, not a new mapping
    assert_eq!(manager.acquire("main-wal").unwrap(), zone);
    assert_eq!(manager.free_count(), 2);

    // After release, the zone is the first candidate for the next WAL
    manager.release(&zone);
    assert_eq!(manager.acquire("other-wal").unwrap(), zone);

    cleanup_root(&root);
}

#[test]
fn lookup_tracks_the_live_mapping() {
    let root = test_root("lookup", &["0000", "0001"]);
    let manager = ZoneManager::discover(&root).unwrap();

    assert!(manager.lookup("db-wal").is_none());

    let zone = manager.acquire("db-wal").unwrap();
    assert_eq!(manager.lookup("db-wal").unwrap(), zone);

    manager.release(&zone);
    assert!(manager.lookup("db-wal").is_none());

    cleanup_root(&root);
}

#[test]
fn concurrent_acquires_get_distinct_zones() {
    let root = test_root("concurrent", &["0000", "0001", "0002", "0003"]);
    let manager = Arc::new(ZoneManager::discover(&root).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.acquire(&format!("wal-{i}-wal")).unwrap())
        })
        .collect();

    let mut zones: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    zones.sort();
    zones.dedup();
    assert_eq!(zones.len(), 4);
    assert_eq!(manager.free_count(), 0);

    cleanup_root(&root);
}

#[test]
fn reset_zone_discards_content() {
    let root = test_root("reset", &["0000"]);
    let zone = root.join("0000");
    std::fs::write(&zone, vec![0x5au8; 8192]).unwrap();

    reset_zone(&zone).unwrap();
    assert_eq!(std::fs::metadata(&zone).unwrap().len(), 0);

    cleanup_root(&root);
}
