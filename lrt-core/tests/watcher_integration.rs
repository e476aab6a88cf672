//! Exercises `Watcher` against a real filesystem, confirming relevant
//! source edits reach the channel while filtered events don't.

use std::time::Duration;

use lrt_core::watch::Watcher;
use tokio::sync::mpsc;

#[tokio::test]
async fn relevant_source_write_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = Watcher::new(tx).unwrap();
    watcher.watch_dir(dir.path()).unwrap();

    let file_path = dir.path().join("main.go");
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::write(&file_path, b"package main\n").unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected a change signal within timeout")
        .expect("channel closed unexpectedly");

    assert_eq!(signal.path, file_path);
}

#[tokio::test]
async fn test_file_writes_are_filtered() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = Watcher::new(tx).unwrap();
    watcher.watch_dir(dir.path()).unwrap();

    let test_file = dir.path().join("main_test.go");
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::write(&test_file, b"package main\n").unwrap();

    // Follow up with a real signal so the test doesn't just wait out a
    // fixed timeout for the (expected) absence of the filtered event.
    let real_file = dir.path().join("real.go");
    std::fs::write(&real_file, b"package main\n").unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected a change signal within timeout")
        .expect("channel closed unexpectedly");

    assert_eq!(signal.path, real_file);
}
