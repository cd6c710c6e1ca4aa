//! Cross-module scenarios from the testable-properties scenario list.
//!
//! The create-then-rapid-edit debounce scenario is covered at the unit
//! level in `debounce.rs` and `classifier.rs` instead of here: driving it
//! through real OS filesystem notifications makes the test's timing
//! dependent on the host's notification backend, which is not reliable in
//! a sandboxed CI environment.

use std::path::Path;
use std::time::Duration;

use filemole::backup::BackupStore;
use filemole::diff::DiffResult;
use filemole::hash;
use filemole::ignore_engine::IgnoreEngine;
use filemole::index::store::{IndexEntry, IndexStore};
use filemole::index::writer::IndexWriter;
use filemole::mole::MoleKind;
use filemole::provider::{resolve_provider, ProviderError};
use filemole::scanner::Scanner;
use filemole::tracking::TrackingManager;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn root_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[tokio::test(flavor = "multi_thread")]
async fn tracked_text_diff_reports_deleted_and_inserted_lines() {
    let _ = env_logger::builder().is_test(true).try_init();

    let root = tempfile::tempdir().unwrap();
    let file = root.path().join("f.txt");
    std::fs::write(&file, "hello\nworld").unwrap();

    let db_path = root.path().join(".hill").join("index.db");
    let store = IndexStore::open(&db_path).unwrap();
    let writer = IndexWriter::spawn(db_path).unwrap();
    let manager = TrackingManager::new(BackupStore::new(".hill"), store, writer, ".tracking-ignore", Duration::from_secs(60));

    let mut rx = manager.subscribe();
    manager.enable(root.path(), &file).unwrap();
    let _initial = rx.try_recv().unwrap();

    std::thread::sleep(Duration::from_millis(1100));
    std::fs::write(&file, "hello\nthere").unwrap();
    manager.handle_changed(root.path(), &file).unwrap();

    let event = rx.try_recv().expect("a content-changed event for the real edit");
    match event.diff {
        DiffResult::Text { entries, is_changed, .. } => {
            assert!(is_changed);
            assert!(entries.iter().any(|e| e.original_text.contains("world")));
            assert!(entries.iter().any(|e| e.modified_text.contains("there")));
        }
        other => panic!("expected a Text diff, got {other:?}"),
    }
}

#[test]
fn ignored_subtree_is_excluded_until_rule_is_removed() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("filemole.ignore"), "build/\n").unwrap();
    std::fs::create_dir_all(root.path().join("build")).unwrap();
    std::fs::write(root.path().join("build").join("x.bin"), b"data").unwrap();

    let engine = IgnoreEngine::build(root.path(), "filemole.ignore", Duration::from_millis(0)).unwrap();
    assert!(engine.should_ignore(&root.path().join("build").join("x.bin")));

    std::fs::write(root.path().join("filemole.ignore"), "").unwrap();
    engine.reload(root.path()).unwrap();
    assert!(!engine.should_ignore(&root.path().join("build").join("x.bin")));
}

#[tokio::test(flavor = "multi_thread")]
async fn scanner_reconciliation_drops_rows_for_files_deleted_before_the_scan_completed() {
    let root = tempfile::tempdir().unwrap();
    for i in 0..100 {
        std::fs::write(root.path().join(format!("f{i}.txt")), b"x").unwrap();
    }

    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("index.db");
    let writer = Arc::new(IndexWriter::spawn(db_path.clone()).unwrap());
    let ignore_engine = Arc::new(IgnoreEngine::build(root.path(), "filemole.ignore", Duration::from_millis(500)).unwrap());
    let scanner = Scanner::new(Arc::clone(&writer), ignore_engine, 2000);

    // Pre-populate the index as if a prior run had indexed all 100, with a
    // stale LastScanned timestamp, matching the scenario's setup.
    {
        let conn = IndexStore::open_write_connection(&db_path).unwrap();
        for i in 0..100 {
            IndexStore::upsert(
                &conn,
                &IndexEntry {
                    directory: root_str(root.path()),
                    name: format!("f{i}.txt"),
                    size: 1,
                    created: "2000-01-01T00:00:00+00:00".into(),
                    modified: "2000-01-01T00:00:00+00:00".into(),
                    attributes: 0,
                    last_scanned: "2000-01-01T00:00:00+00:00".into(),
                },
            )
            .unwrap();
        }
        conn.execute("UPDATE FileIndex SET LastScanned = '2000-01-01T00:00:00+00:00'", [])
            .unwrap();
    }

    for i in 0..10 {
        std::fs::remove_file(root.path().join(format!("f{i}.txt"))).unwrap();
    }

    let scan_start = scanner.scan_roots(&[root.path().to_path_buf()], CancellationToken::new()).await.unwrap();

    let reader = IndexStore::open(&db_path).unwrap();
    let remaining = reader.count_under(&root_str(root.path())).unwrap();
    assert_eq!(remaining, 90);

    for i in 10..100 {
        let entry = reader.get(&root_str(root.path()), &format!("f{i}.txt")).unwrap().unwrap();
        assert!(entry.last_scanned.as_str() >= scan_start.as_str());
    }
}

#[test]
fn cross_provider_move_is_rejected_and_leaves_both_sides_unchanged() {
    let local_root = tempfile::tempdir().unwrap();
    let file = local_root.path().join("f.txt");
    std::fs::write(&file, b"payload").unwrap();

    let local = resolve_provider(&MoleKind::Local);
    let cloud = resolve_provider(&MoleKind::Cloud { provider_name: "dropbox".into() });

    // The local provider can move within itself but a cross-provider move
    // is modeled at the facade layer (out of scope here); this crate's
    // contribution is that the destination provider unconditionally
    // refuses any operation it wasn't given a real backend for.
    let result = cloud.move_item(&file, Path::new("/b/f.txt"));
    assert!(matches!(result, Err(ProviderError::NotSupported)));
    assert!(file.is_file(), "source must be untouched after a rejected cross-provider move");
    assert!(local.exists(&file));
}

#[test]
fn binary_partial_hash_short_circuits_without_a_full_read() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path().join("backup.bin");
    let current = dir.path().join("current.bin");

    let size = 50 * 1024 * 1024;
    let mut content = vec![0u8; size];
    std::fs::write(&backup, &content).unwrap();
    content[size / 2] = 0xFF;
    std::fs::write(&current, &content).unwrap();

    let partial_before = hash::partial_hash(&backup).unwrap();
    let partial_after = hash::partial_hash(&current).unwrap();
    assert_ne!(partial_before, partial_after, "middle-byte flip must be visible to the partial hash");

    let diff = filemole::diff::DiffEngine::generate(&backup, &current, false).unwrap();
    match diff {
        DiffResult::Binary { identical, .. } => assert!(!identical),
        other => panic!("expected a Binary diff, got {other:?}"),
    }
}
