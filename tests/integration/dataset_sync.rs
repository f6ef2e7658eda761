//! Commit, push, pull and checkout across working copies sharing one remote

use crate::integration::test_utils::{write_file, Workspace, DATASET_ID};
use conservator::dataset::hasher::{compute_commit_hash, hash_bytes};
use conservator::dataset::{
    ChangeKind, Commit, IndexEntry, IndexProblem, LocalDataset, StagedChange, SyncContext,
};
use conservator::remote::DatasetRemote;
use conservator::ApiError;
use std::collections::BTreeMap;

#[test]
fn test_linear_history_push_and_divergence() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    assert!(ds.head().is_none());

    write_file(ds.root(), "data/a.jpg", b"frame a v1");
    write_file(ds.root(), "data/b.jpg", b"frame b");
    assert_eq!(ds.add_local_changes().unwrap(), 2);

    let first = ds.commit("first", "tester").unwrap();
    assert_eq!(first.parent, None);
    assert_eq!(first.hash, compute_commit_hash(None, &first.tree, "first"));
    assert_eq!(
        first.tree.keys().cloned().collect::<Vec<_>>(),
        vec!["data/a.jpg", "data/b.jpg"]
    );
    assert_eq!(first.tree["data/a.jpg"].hash, hash_bytes(b"frame a v1"));

    write_file(ds.root(), "data/a.jpg", b"frame a v2");
    assert_eq!(ds.add_local_changes().unwrap(), 1);
    assert!(matches!(
        ds.index().staged.get("data/a.jpg"),
        Some(StagedChange::Modified(_))
    ));
    let second = ds.commit("second", "tester").unwrap();
    assert_eq!(second.parent, Some(first.hash));
    assert_eq!(
        second.hash,
        compute_commit_hash(Some(&first.hash), &second.tree, "second")
    );

    let report = ds.push_commits().unwrap();
    assert_eq!(report.commits, 2);
    assert_eq!(report.blobs_uploaded, 3);
    assert_eq!(report.head, Some(second.hash));
    assert_eq!(ws.remote.head(DATASET_ID).unwrap(), Some(second.hash));
    assert!(!ds.heads().has_unpushed());

    // Another client moves the remote HEAD somewhere unrelated.
    ws.remote
        .set_head(DATASET_ID, Some(hash_bytes(b"someone else's commit")));
    write_file(ds.root(), "data/c.jpg", b"frame c");
    ds.add_local_changes().unwrap();
    ds.commit("third", "tester").unwrap();

    let err = ds.push_commits().unwrap_err();
    assert!(matches!(err, ApiError::NonLinearHistory { .. }));
    assert_eq!(
        ws.remote.head(DATASET_ID).unwrap(),
        Some(hash_bytes(b"someone else's commit"))
    );
}

#[test]
fn test_second_push_of_same_history_uploads_nothing() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    write_file(ds.root(), "data/a.jpg", b"a");
    ds.add_local_changes().unwrap();
    ds.commit("first", "tester").unwrap();
    ds.push_commits().unwrap();
    let uploads = ws.remote.upload_count();

    let report = ds.push_commits().unwrap();
    assert_eq!(report.commits, 0);
    assert_eq!(ws.remote.upload_count(), uploads);
}

#[test]
fn test_clone_and_pull_follow_remote() {
    let ws = Workspace::new();
    let mut writer = ws.clone_dataset("writer");
    write_file(writer.root(), "data/a.jpg", b"a");
    write_file(writer.root(), "labels/a.json", br#"{"label": "car"}"#);
    writer.add_local_changes().unwrap();
    let first = writer.commit("first", "writer").unwrap();
    writer.push_commits().unwrap();

    let mut reader = ws.clone_dataset("reader");
    assert_eq!(reader.head(), Some(first.hash));
    assert_eq!(std::fs::read(reader.root().join("data/a.jpg")).unwrap(), b"a");
    assert_eq!(reader.log().unwrap().len(), 1);

    write_file(writer.root(), "data/b.jpg", b"b");
    std::fs::remove_file(writer.root().join("labels/a.json")).unwrap();
    writer.add_local_changes().unwrap();
    let second = writer.commit("second", "writer").unwrap();
    writer.push_commits().unwrap();

    let report = reader.pull().unwrap();
    assert_eq!(report.commits, 1);
    assert_eq!(report.head, Some(second.hash));
    assert_eq!(reader.head(), Some(second.hash));
    assert_eq!(std::fs::read(reader.root().join("data/b.jpg")).unwrap(), b"b");
    assert!(!reader.root().join("labels/a.json").exists());
    assert!(reader.validate_index().unwrap().is_empty());

    let again = reader.pull().unwrap();
    assert_eq!(again.commits, 0);
}

#[test]
fn test_failed_pull_leaves_working_tree_untouched() {
    let ws = Workspace::new();
    let mut writer = ws.clone_dataset("writer");
    write_file(writer.root(), "data/keep.jpg", b"keep");
    writer.add_local_changes().unwrap();
    let first = writer.commit("first", "writer").unwrap();
    writer.push_commits().unwrap();

    let mut reader = ws.clone_dataset("reader");
    assert_eq!(reader.head(), Some(first.hash));

    // The next remote commit drops keep.jpg and needs a blob nobody uploaded.
    let mut tree = BTreeMap::new();
    tree.insert(
        "data/lost.jpg".to_string(),
        IndexEntry {
            hash: hash_bytes(b"never uploaded"),
            size: 14,
            frame: None,
        },
    );
    let broken = Commit::new(Some(first.hash), tree, "broken", "other");
    ws.remote
        .push_commits(DATASET_ID, Some(first.hash), &[broken])
        .unwrap();

    assert!(reader.pull().is_err());
    assert_eq!(reader.head(), Some(first.hash));
    assert_eq!(
        std::fs::read(reader.root().join("data/keep.jpg")).unwrap(),
        b"keep"
    );
    assert!(!reader.root().join("data/lost.jpg").exists());
    assert!(reader.validate_index().unwrap().is_empty());

    let reopened = ws.open_dataset("reader");
    assert_eq!(reopened.head(), Some(first.hash));
    assert!(reopened.index().entries.contains_key("data/keep.jpg"));
}

#[test]
fn test_cache_inside_working_copy_is_not_tracked() {
    let ws = Workspace::new();
    let root = ws.base.join("inner");
    let ctx = SyncContext::new(ws.remote.clone(), ws.remote.clone(), root.join("cache"), 2);
    let mut ds = LocalDataset::clone(ctx, DATASET_ID, &root).unwrap();

    write_file(ds.root(), "data/a.jpg", b"frame a");
    assert_eq!(ds.add_local_changes().unwrap(), 1);
    ds.commit("first", "t").unwrap();
    assert!(root.join("cache").is_dir());

    assert_eq!(ds.add_local_changes().unwrap(), 0);
    assert!(ds.index().staged.is_empty());
    assert!(ds.status().unwrap().unstaged.is_empty());
    assert!(ds.index().entries.keys().all(|k| !k.starts_with("cache/")));
}

#[test]
fn test_pull_refuses_diverged_history() {
    let ws = Workspace::new();
    let mut one = ws.clone_dataset("one");
    let mut two = ws.clone_dataset("two");

    write_file(one.root(), "data/a.jpg", b"from one");
    one.add_local_changes().unwrap();
    one.commit("one", "t").unwrap();
    one.push_commits().unwrap();

    write_file(two.root(), "data/b.jpg", b"from two");
    two.add_local_changes().unwrap();
    two.commit("two", "t").unwrap();

    assert!(matches!(
        two.push_commits(),
        Err(ApiError::NonLinearHistory { .. })
    ));
    assert!(matches!(two.pull(), Err(ApiError::NonLinearHistory { .. })));
}

#[test]
fn test_add_commit_then_validate() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    write_file(ds.root(), "data/a.jpg", b"a");
    write_file(ds.root(), "data/b.jpg", b"b");
    ds.add_local_changes().unwrap();
    ds.commit("first", "t").unwrap();
    assert!(ds.validate_index().unwrap().is_empty());

    write_file(ds.root(), "data/a.jpg", b"tampered");
    std::fs::remove_file(ds.root().join("data/b.jpg")).unwrap();
    let problems = ds.validate_index().unwrap();
    assert_eq!(problems.len(), 2);
    assert!(problems.iter().any(|p| matches!(
        p,
        IndexProblem::HashMismatch { key, actual, .. }
            if key == "data/a.jpg" && *actual == hash_bytes(b"tampered")
    )));
    assert!(problems
        .iter()
        .any(|p| matches!(p, IndexProblem::Missing { key } if key == "data/b.jpg")));

    // Validation only reports.
    assert!(ds.index().staged.is_empty());
}

#[test]
fn test_status_survives_reopen() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    write_file(ds.root(), "data/a.jpg", b"a");
    ds.add_local_changes().unwrap();
    write_file(ds.root(), "data/b.jpg", b"b");

    let reopened = ws.open_dataset("wc");
    let status = reopened.status().unwrap();
    assert_eq!(status.staged, vec![("data/a.jpg".to_string(), ChangeKind::Added)]);
    assert_eq!(status.unstaged, vec![("data/b.jpg".to_string(), ChangeKind::Added)]);
    assert_eq!(reopened.index(), ds.index());
}

#[test]
fn test_checkout_older_commit_and_back() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    write_file(ds.root(), "data/a.jpg", b"a1");
    ds.add_local_changes().unwrap();
    let first = ds.commit("first", "t").unwrap();

    write_file(ds.root(), "data/a.jpg", b"a2");
    write_file(ds.root(), "data/b.jpg", b"b");
    ds.add_local_changes().unwrap();
    let second = ds.commit("second", "t").unwrap();

    ds.checkout(&first.hash, false).unwrap();
    assert_eq!(ds.head(), Some(first.hash));
    assert_eq!(std::fs::read(ds.root().join("data/a.jpg")).unwrap(), b"a1");
    assert!(!ds.root().join("data/b.jpg").exists());

    ds.checkout(&second.hash, false).unwrap();
    assert_eq!(std::fs::read(ds.root().join("data/a.jpg")).unwrap(), b"a2");
    assert_eq!(std::fs::read(ds.root().join("data/b.jpg")).unwrap(), b"b");
    assert!(ds.validate_index().unwrap().is_empty());
}
