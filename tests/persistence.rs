#![cfg(feature = "persistent")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use statebus::{SnapshotFile, Store, StoreOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    count: i64,
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

fn saved_count(file: &SnapshotFile) -> Option<i64> {
    file.load()
        .ok()
        .flatten()
        .and_then(|envelope| envelope.state.field("count").and_then(statebus::StateTree::as_i64))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_file_persists_and_rehydrates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.sbus");

    let first = Store::with_options(
        Counter { count: 0 },
        StoreOptions::new().snapshot_file(SnapshotFile::new(&path)),
    )
    .unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _sub = first
        .system_events()
        .subscribe_next(move |event| sink.lock().unwrap().push(event.event_type().to_string()));

    let file = SnapshotFile::new(&path);
    eventually(|| saved_count(&file) == Some(0)).await;
    assert!(!first.is_hydrated());
    assert!(!errors.lock().unwrap().iter().any(|t| t.ends_with("_ERROR")));

    first.publish_at("count", &7).unwrap();
    eventually(|| saved_count(&file) == Some(7)).await;
    first.destroy();

    let second = Store::with_options(
        Counter { count: 0 },
        StoreOptions::new().snapshot_file(file.clone()),
    )
    .unwrap();
    eventually(|| second.is_hydrated()).await;
    assert_eq!(second.state().unwrap(), Counter { count: 7 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_file_reports_unreadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.sbus");
    std::fs::write(&path, b"garbage").unwrap();

    let store = Store::with_options(
        Counter { count: 3 },
        StoreOptions::new().snapshot_file(SnapshotFile::new(&path)),
    )
    .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = store
        .system_events()
        .subscribe_next(move |event| sink.lock().unwrap().push(event.event_type().to_string()));

    eventually(|| seen.lock().unwrap().iter().any(|t| t == "@@HYDRATE_ERROR")).await;
    assert!(!store.is_hydrated());
    assert_eq!(store.state().unwrap().count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_snapshot_in_custom_hydrator_is_a_hydrate_error() {
    let dir = tempfile::tempdir().unwrap();
    let reader = SnapshotFile::new(dir.path().join("absent.sbus"));
    let store = Store::with_options(
        Counter { count: 3 },
        StoreOptions::new().hydrator(move || async move { reader.load_state::<Counter>().await }),
    )
    .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = store
        .system_events()
        .subscribe_next(move |event| sink.lock().unwrap().push(event.event_type().to_string()));

    eventually(|| seen.lock().unwrap().iter().any(|t| t == "@@HYDRATE_ERROR")).await;
    assert!(!store.is_hydrated());
    assert_eq!(store.state().unwrap().count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corrupted_snapshot_is_a_hydrate_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.sbus");
    std::fs::write(&path, b"garbage").unwrap();

    let file = SnapshotFile::new(&path);
    let reader = file.clone();
    let store = Store::with_options(
        Counter { count: 3 },
        StoreOptions::new().hydrator(move || async move { reader.load_state::<Counter>().await }),
    )
    .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = store.system_events().subscribe_next(move |event| {
        if let Some(report) = event.failure() {
            sink.lock().unwrap().push(report.message());
        }
    });

    eventually(|| !seen.lock().unwrap().is_empty()).await;
    assert!(seen.lock().unwrap()[0].contains("corrupted"));
    assert_eq!(store.state().unwrap().count, 3);
}
