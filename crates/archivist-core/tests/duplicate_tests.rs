use archivist_core::analysis::resolve::{apply_merge, plan_merge, sort_group, MergeOutcome};
use archivist_core::storage::Database;
use archivist_core::{
    DuplicateQueryEngine, FileIdentity, RecordingReporter, ReportEvent, ScanEngine, Sha256Hash,
    SilentReporter, VolumeDescriptor,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn descriptor(stable_id: &str, root: &Path) -> VolumeDescriptor {
    VolumeDescriptor {
        stable_id: stable_id.to_string(),
        label: stable_id.to_string(),
        root: root.to_path_buf(),
        total_space: 0,
        free_space: 0,
    }
}

fn identity(seed: u8) -> FileIdentity {
    FileIdentity::new(
        seed as u64,
        Sha256Hash::from([seed; 32]),
        Sha256Hash::from([seed; 32]),
    )
}

/// Two volumes: content 1 three times on `main`, content 2 on both volumes, content 3 only on
/// `main`, content 4 only on `backup`.
fn populated() -> (Database, i64, i64) {
    let db = Database::open_in_memory().unwrap();
    let main = db
        .ensure_volume(&descriptor("main", Path::new("/mnt/main")))
        .unwrap()
        .id;
    let backup = db
        .ensure_volume(&descriptor("backup", Path::new("/mnt/backup")))
        .unwrap()
        .id;
    db.index_file(main, "", "one.jpg", &identity(1), 1).unwrap();
    db.index_file(main, "/Photos", "one.jpg", &identity(1), 1).unwrap();
    db.index_file(main, "/Photos/old", "one-copy.jpg", &identity(1), 1)
        .unwrap();
    db.index_file(main, "", "two.jpg", &identity(2), 1).unwrap();
    db.index_file(backup, "", "two.jpg", &identity(2), 1).unwrap();
    db.index_file(main, "", "three.jpg", &identity(3), 1).unwrap();
    db.index_file(backup, "", "four.jpg", &identity(4), 1).unwrap();
    (db, main, backup)
}

#[test]
fn test_group_with_three_siblings_returned_once() {
    let (db, main, _) = populated();
    let groups = DuplicateQueryEngine::new(&db)
        .duplicates_on_volume(main, None)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
    assert!(groups[0].iter().all(|r| r.content_entry_id == groups[0][0].content_entry_id));
}

#[test]
fn test_duplicates_with_subdir() {
    let (db, main, _) = populated();
    let engine = DuplicateQueryEngine::new(&db);
    assert_eq!(
        engine
            .duplicates_on_volume(main, Some("photos/old"))
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        engine
            .duplicates_on_volume(main, Some("C:\\PHOTOS"))
            .unwrap()
            .len(),
        1
    );
    assert!(engine
        .duplicates_on_volume(main, Some("/Videos"))
        .unwrap()
        .is_empty());
}

#[test]
fn test_exclusive_to_volume() {
    let (db, main, backup) = populated();
    let engine = DuplicateQueryEngine::new(&db);

    let names = |groups: Vec<Vec<archivist_core::storage::StorageRecord>>| -> Vec<String> {
        groups.iter().map(|g| g[0].file_name.clone()).collect()
    };
    assert_eq!(
        names(engine.exclusive_to_volume(main).unwrap()),
        vec!["one.jpg", "three.jpg"]
    );
    assert_eq!(
        names(engine.exclusive_to_volume(backup).unwrap()),
        vec!["four.jpg"]
    );
}

#[test]
fn test_list_files_by_instance_count() {
    let (db, main, backup) = populated();
    let engine = DuplicateQueryEngine::new(&db);

    assert_eq!(engine.list_files(None, false, None, None).unwrap().len(), 4);
    assert_eq!(engine.list_files(None, false, Some(2), None).unwrap().len(), 2);
    assert_eq!(engine.list_files(None, false, Some(2), Some(2)).unwrap().len(), 1);

    // counted across volumes, content 2 has two instances; restricted to backup it has one
    assert_eq!(
        engine.list_files(Some(backup), false, Some(2), None).unwrap().len(),
        1
    );
    assert!(engine
        .list_files(Some(backup), true, Some(2), None)
        .unwrap()
        .is_empty());
    let on_main = engine.list_files(Some(main), true, None, None).unwrap();
    assert!(on_main.iter().flatten().all(|r| r.volume_id == main));
}

#[test]
fn test_search_groups_by_content() {
    let (db, _, _) = populated();
    let groups = DuplicateQueryEngine::new(&db).search("ONE-").unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
    assert!(DuplicateQueryEngine::new(&db).search("nothing").unwrap().is_empty());
}

/// A scanned volume holding `x.jpg`, `a/y.jpg` and `b/x.jpg` with identical content.
fn scanned_duplicates() -> (tempfile::TempDir, Database, i64) {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("a")).unwrap();
    fs::create_dir_all(tmp.path().join("b")).unwrap();
    for path in ["x.jpg", "a/y.jpg", "b/x.jpg"] {
        fs::write(tmp.path().join(path), "same bytes").unwrap();
    }
    let db = Database::open_in_memory().unwrap();
    let volumes = vec![descriptor("vol", tmp.path())];
    let results = ScanEngine::new(&db)
        .scan(&volumes, None, &SilentReporter)
        .unwrap();
    let volume_id = results[0].volume.id;
    (tmp, db, volume_id)
}

#[test]
fn test_merge_deletes_siblings_and_renames() {
    let (tmp, db, volume_id) = scanned_duplicates();
    let mut group = DuplicateQueryEngine::new(&db)
        .duplicates_on_volume(volume_id, None)
        .unwrap()
        .remove(0);
    sort_group(&mut group);
    // sorted: /a/y.jpg, /b/x.jpg, /x.jpg
    assert_eq!(group[0].relative_path(), "/a/y.jpg");

    let plan = plan_merge(tmp.path(), &group, 0, Some("z.jpg")).unwrap();
    let reporter = RecordingReporter::new();
    let outcome = apply_merge(&db, &plan, &reporter).unwrap();

    let renamed = tmp.path().join("a/z.jpg");
    assert_eq!(
        outcome,
        MergeOutcome::Applied {
            deleted: vec![tmp.path().join("b/x.jpg"), tmp.path().join("x.jpg")],
            renamed_to: Some(renamed.clone()),
            rename_skipped: false,
        }
    );
    assert!(renamed.is_file());
    assert!(!tmp.path().join("a/y.jpg").exists());
    assert!(!tmp.path().join("x.jpg").exists());

    let records = db.storage_records_on_volume(Some(volume_id)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].relative_path(), "/a/z.jpg");
    assert_eq!(records[0].content_entry_id, group[0].content_entry_id);
}

#[test]
fn test_merge_rename_skipped_when_target_exists() {
    let (tmp, db, volume_id) = scanned_duplicates();
    fs::write(tmp.path().join("a/x.jpg"), "unrelated").unwrap();
    let mut group = DuplicateQueryEngine::new(&db)
        .duplicates_on_volume(volume_id, None)
        .unwrap()
        .remove(0);
    sort_group(&mut group);

    let plan = plan_merge(tmp.path(), &group, 0, Some("x.jpg")).unwrap();
    let reporter = RecordingReporter::new();
    let outcome = apply_merge(&db, &plan, &reporter).unwrap();

    assert!(matches!(
        outcome,
        MergeOutcome::Applied {
            renamed_to: None,
            rename_skipped: true,
            ..
        }
    ));
    assert!(tmp.path().join("a/y.jpg").is_file());
    assert_eq!(fs::read(tmp.path().join("a/x.jpg")).unwrap(), b"unrelated");
    assert!(reporter
        .events()
        .iter()
        .any(|e| matches!(e, ReportEvent::RenameSkipped { .. })));
    let records = db.storage_records_on_volume(Some(volume_id)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].relative_path(), "/a/y.jpg");
}

#[test]
fn test_merge_with_missing_file_changes_nothing() {
    let (tmp, db, volume_id) = scanned_duplicates();
    let mut group = DuplicateQueryEngine::new(&db)
        .duplicates_on_volume(volume_id, None)
        .unwrap()
        .remove(0);
    sort_group(&mut group);
    fs::remove_file(tmp.path().join("b/x.jpg")).unwrap();

    let plan = plan_merge(tmp.path(), &group, 0, None).unwrap();
    let reporter = RecordingReporter::new();
    let outcome = apply_merge(&db, &plan, &reporter).unwrap();

    let missing: Vec<PathBuf> = vec![tmp.path().join("b/x.jpg")];
    assert_eq!(outcome, MergeOutcome::Inconsistent { missing: missing.clone() });
    assert!(tmp.path().join("x.jpg").is_file());
    assert!(tmp.path().join("a/y.jpg").is_file());
    assert_eq!(db.storage_records_on_volume(Some(volume_id)).unwrap().len(), 3);
    assert_eq!(
        reporter.events(),
        vec![ReportEvent::InconsistentGroup { missing }]
    );
}

#[test]
fn test_failed_rename_still_records_deletions() {
    let (tmp, db, volume_id) = scanned_duplicates();
    let mut group = DuplicateQueryEngine::new(&db)
        .duplicates_on_volume(volume_id, None)
        .unwrap()
        .remove(0);
    sort_group(&mut group);

    // the target directory does not exist, so the rename fails after the deletions
    let plan = plan_merge(tmp.path(), &group, 0, Some("missing/z.jpg")).unwrap();
    assert!(apply_merge(&db, &plan, &SilentReporter).is_err());

    assert!(tmp.path().join("a/y.jpg").is_file());
    assert!(!tmp.path().join("b/x.jpg").exists());
    assert!(!tmp.path().join("x.jpg").exists());
    let records = db.storage_records_on_volume(Some(volume_id)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].relative_path(), "/a/y.jpg");
}
