use archivist_core::storage::Database;
use archivist_core::{
    DuplicateQueryEngine, RecordingReporter, ReportEvent, ScanEngine, SilentReporter,
    VolumeDescriptor, VolumeScanOutcome,
};
use filetime::FileTime;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn volume_at(stable_id: &str, root: &Path) -> VolumeDescriptor {
    VolumeDescriptor {
        stable_id: stable_id.to_string(),
        label: stable_id.to_uppercase(),
        root: root.to_path_buf(),
        total_space: 0,
        free_space: 0,
    }
}

/// Layout:
///   root/
///     a.txt            ("alpha")
///     photos/b.jpg     ("bravo")
///     photos/2024/c.jpg ("alpha")  <- same content as a.txt
fn create_tree(root: &Path) {
    fs::create_dir_all(root.join("photos/2024")).unwrap();
    fs::write(root.join("a.txt"), "alpha").unwrap();
    fs::write(root.join("photos/b.jpg"), "bravo").unwrap();
    fs::write(root.join("photos/2024/c.jpg"), "alpha").unwrap();
}

fn scanned(outcome: &VolumeScanOutcome) -> &archivist_core::scanner::ReconcileStats {
    match outcome {
        VolumeScanOutcome::Scanned(stats) => stats,
        other => panic!("volume was not scanned: {:?}", other),
    }
}

fn setup() -> (TempDir, Vec<VolumeDescriptor>, Database) {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path());
    let volumes = vec![volume_at("vol-1", tmp.path())];
    (tmp, volumes, Database::open_in_memory().unwrap())
}

#[test]
fn test_first_scan_indexes_every_file() {
    let (_tmp, volumes, db) = setup();
    let results = ScanEngine::new(&db)
        .scan(&volumes, None, &SilentReporter)
        .unwrap();

    assert_eq!(results.len(), 1);
    let stats = scanned(&results[0].outcome);
    assert_eq!(stats.files_checked, 3);
    assert_eq!(stats.updated, 3);
    assert_eq!(stats.discarded, 0);

    let records = db.storage_records_on_volume(None).unwrap();
    let mut paths: Vec<String> = records.iter().map(|r| r.relative_path()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/a.txt", "/photos/2024/c.jpg", "/photos/b.jpg"]);
    assert_eq!(db.content_entry_count().unwrap(), 2);

    let volume = db.get_volume(results[0].volume.id).unwrap().unwrap();
    assert!(!volume.dirty);
    assert!(volume.last_scan.is_some());
}

#[test]
fn test_rescan_without_changes_is_idempotent() {
    let (_tmp, volumes, db) = setup();
    let engine = ScanEngine::new(&db);
    engine.scan(&volumes, None, &SilentReporter).unwrap();
    let mut before = db.storage_records_on_volume(None).unwrap();

    let reporter = RecordingReporter::new();
    let results = engine.scan(&volumes, None, &reporter).unwrap();
    let stats = scanned(&results[0].outcome);
    assert_eq!(stats.unchanged, 3);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.discarded, 0);

    let mut after = db.storage_records_on_volume(None).unwrap();
    before.iter_mut().for_each(|r| r.last_seen = 0);
    after.iter_mut().for_each(|r| r.last_seen = 0);
    assert_eq!(before, after);
    assert_eq!(db.content_entry_count().unwrap(), 2);
    assert!(reporter
        .events()
        .iter()
        .all(|e| matches!(e, ReportEvent::FileUnchanged { .. })));
}

#[test]
fn test_removed_file_is_swept() {
    let (tmp, volumes, db) = setup();
    let engine = ScanEngine::new(&db);
    engine.scan(&volumes, None, &SilentReporter).unwrap();

    fs::remove_file(tmp.path().join("photos/b.jpg")).unwrap();
    let reporter = RecordingReporter::new();
    let results = engine.scan(&volumes, None, &reporter).unwrap();

    assert_eq!(scanned(&results[0].outcome).discarded, 1);
    assert_eq!(db.storage_records_on_volume(None).unwrap().len(), 2);
    assert!(reporter.events().contains(&ReportEvent::FileDiscarded {
        volume: "VOL-1".to_string(),
        path: "/photos/b.jpg".to_string(),
    }));
    // content entries outlive their last storage record
    assert_eq!(db.content_entry_count().unwrap(), 2);
}

#[test]
fn test_changed_content_gets_a_new_entry() {
    let (tmp, volumes, db) = setup();
    let engine = ScanEngine::new(&db);
    engine.scan(&volumes, None, &SilentReporter).unwrap();
    let volume_id = db.list_volumes().unwrap()[0].id;
    let before = db
        .find_storage_record(volume_id, "/photos", "b.jpg")
        .unwrap()
        .unwrap();

    let path = tmp.path().join("photos/b.jpg");
    fs::write(&path, "BRAVO").unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    let results = engine.scan(&volumes, None, &SilentReporter).unwrap();
    assert_eq!(scanned(&results[0].outcome).updated, 1);

    let after = db
        .find_storage_record(volume_id, "/photos", "b.jpg")
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.modified_at, 1_600_000_000);
    assert_ne!(after.content_entry_id, before.content_entry_id);
    assert!(db.get_content_entry(before.content_entry_id).unwrap().is_some());
}

#[test]
fn test_large_file_keeps_distinct_short_and_full_hash() {
    let (tmp, volumes, db) = setup();
    let mut content = vec![0u8; 200 * 1024];
    content[20 * 1024] = 1;
    fs::write(tmp.path().join("big.bin"), &content).unwrap();

    ScanEngine::new(&db)
        .scan(&volumes, None, &SilentReporter)
        .unwrap();
    let volume_id = db.list_volumes().unwrap()[0].id;
    let big = db
        .find_storage_record(volume_id, "", "big.bin")
        .unwrap()
        .unwrap();
    assert_eq!(big.size, 200 * 1024);
    assert_ne!(big.short_hash, big.hash);

    let small = db
        .find_storage_record(volume_id, "", "a.txt")
        .unwrap()
        .unwrap();
    assert_eq!(small.short_hash, small.hash);
}

#[test]
fn test_disabled_volume_is_left_alone() {
    let (_tmp, volumes, db) = setup();
    let volume = db.ensure_volume(&volumes[0]).unwrap();
    db.set_volume_should_scan(volume.id, false).unwrap();

    let reporter = RecordingReporter::new();
    let results = ScanEngine::new(&db).scan(&volumes, None, &reporter).unwrap();

    assert!(matches!(results[0].outcome, VolumeScanOutcome::Disabled));
    assert!(db.storage_records_on_volume(None).unwrap().is_empty());
    assert!(matches!(
        reporter.events()[0],
        ReportEvent::VolumeSkipped { .. }
    ));
}

#[test]
fn test_unreadable_root_fails_only_that_volume() {
    let (tmp, mut volumes, db) = setup();
    volumes.insert(0, volume_at("gone", &tmp.path().join("does-not-exist")));

    let results = ScanEngine::new(&db)
        .scan(&volumes, None, &SilentReporter)
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(matches!(results[0].outcome, VolumeScanOutcome::Failed(_)));
    assert_eq!(scanned(&results[1].outcome).updated, 3);
    let gone = db.get_volume(results[0].volume.id).unwrap().unwrap();
    assert!(gone.dirty);
}

#[test]
fn test_scan_only_selected_volume() {
    let (tmp, mut volumes, db) = setup();
    let other = tmp.path().join("other");
    fs::create_dir_all(&other).unwrap();
    volumes.push(volume_at("vol-2", &other));
    let second = db.ensure_volume(&volumes[1]).unwrap();

    let results = ScanEngine::new(&db)
        .scan(&volumes, Some(second.id), &SilentReporter)
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].volume.id, second.id);
    assert!(db.storage_records_on_volume(None).unwrap().is_empty());
}

#[test]
fn test_nested_volume_is_not_indexed_twice() {
    let (tmp, mut volumes, db) = setup();
    let usb_root = tmp.path().join("mnt/usb");
    fs::create_dir_all(&usb_root).unwrap();
    fs::write(usb_root.join("only-copy.jpg"), "single").unwrap();
    volumes.push(volume_at("usb", &usb_root));

    let results = ScanEngine::new(&db)
        .scan(&volumes, None, &SilentReporter)
        .unwrap();
    assert_eq!(scanned(&results[0].outcome).files_checked, 3);
    assert_eq!(scanned(&results[1].outcome).files_checked, 1);

    let usb = results[1].volume.id;
    let copies: Vec<_> = db
        .storage_records_on_volume(None)
        .unwrap()
        .into_iter()
        .filter(|r| r.file_name == "only-copy.jpg")
        .collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].volume_id, usb);
    assert_eq!(copies[0].relative_path(), "/only-copy.jpg");

    let exclusive = DuplicateQueryEngine::new(&db)
        .exclusive_to_volume(usb)
        .unwrap();
    assert_eq!(exclusive.len(), 1);
}

#[cfg(unix)]
#[test]
fn test_unprocessable_file_is_skipped_and_walk_continues() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (tmp, volumes, db) = setup();
    let bad_name = OsStr::from_bytes(b"bad-\xff.jpg");
    fs::write(tmp.path().join("photos").join(bad_name), "unnamed").unwrap();

    let reporter = RecordingReporter::new();
    let results = ScanEngine::new(&db).scan(&volumes, None, &reporter).unwrap();

    let stats = scanned(&results[0].outcome);
    assert_eq!(stats.files_checked, 4);
    assert_eq!(stats.updated, 3);
    assert_eq!(stats.skipped, 1);
    assert_eq!(db.storage_records_on_volume(None).unwrap().len(), 3);
    assert!(reporter
        .events()
        .iter()
        .any(|e| matches!(e, ReportEvent::FileSkipped { path, .. } if path.starts_with("photos/bad-"))));
    let volume = db.get_volume(results[0].volume.id).unwrap().unwrap();
    assert!(!volume.dirty);
}
