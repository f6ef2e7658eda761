//! Staging local images and pushing them as dataset frames

use crate::integration::test_utils::{Workspace, DATASET_ID};
use conservator::dataset::hasher::hash_file;
use conservator::dataset::{FrameLink, StagedChange};
use conservator::ApiError;

#[test]
fn test_push_staged_images_deduplicates_uploads() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    let first = ws.incoming_image("first.jpg", 1);
    let second = ws.incoming_image("second.jpg", 2);

    assert_eq!(ds.stage_local_images(&[first.clone(), second.clone()]).unwrap(), 2);
    // Staging the same path twice keeps one entry.
    assert_eq!(ds.stage_local_images(&[first.clone()]).unwrap(), 0);

    let report = ds.push_staged_images().unwrap();
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.frames.len(), 2);
    assert!(ds.get_staged_images().is_empty());
    assert!(ws.remote.has_blob(&hash_file(&first).unwrap()));
    let uploads = ws.remote.upload_count();

    ds.stage_local_images(&[first, second]).unwrap();
    let report = ds.push_staged_images().unwrap();
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(ws.remote.upload_count(), uploads);
    assert_eq!(ws.remote.blob_count(), 2);
}

#[test]
fn test_pushed_images_become_staged_frames() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    let image = ws.incoming_image("shot.jpg", 7);
    ds.stage_local_images(&[image.clone()]).unwrap();

    let report = ds.push_staged_images().unwrap();
    let key = &report.frames[0];
    let name = key.strip_prefix("data/").unwrap();
    let parsed = FrameLink::parse_file_name(name).unwrap();
    assert_eq!(parsed.video_id, DATASET_ID);
    assert_eq!(parsed.frame_index, 1);
    assert_eq!(ds.get_max_frame_index(), 1);

    match ds.index().staged.get(key) {
        Some(StagedChange::Added(entry)) => {
            let link = entry.frame.as_ref().unwrap();
            assert!(link.is_direct_upload());
            assert_eq!(link.width, Some(32));
            assert_eq!(link.height, Some(24));
            assert_eq!(entry.hash, hash_file(&image).unwrap());
        }
        other => panic!("expected a staged addition, got {:?}", other),
    }
    assert_eq!(
        hash_file(&ds.root().join(key)).unwrap(),
        hash_file(&image).unwrap()
    );

    // The new frames flow through the normal commit and push path.
    let commit = ds.commit("add frames", "t").unwrap();
    assert_eq!(commit.tree.len(), 1);
    let pushed = ds.push_commits().unwrap();
    assert_eq!(pushed.commits, 1);
    assert_eq!(pushed.blobs_uploaded, 0);

    let next = ws.incoming_image("next.jpg", 8);
    ds.stage_local_images(&[next]).unwrap();
    let report = ds.push_staged_images().unwrap();
    assert!(report.frames[0].contains("-frame-000002-"));
}

#[test]
fn test_failed_upload_leaves_index_untouched() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    let good = ws.incoming_image("good.jpg", 1);
    let bad = ws.incoming_image("bad.jpg", 2);
    ds.stage_local_images(&[good, bad]).unwrap();
    let before = ds.index().clone();

    ws.remote.fail_uploads_matching(Some("bad"));
    let err = ds.push_staged_images().unwrap_err();
    match err {
        ApiError::UploadFailed { completed, failed } => {
            assert_eq!(completed, 1);
            assert_eq!(failed, vec!["bad.jpg".to_string()]);
        }
        other => panic!("expected UploadFailed, got {:?}", other),
    }
    assert_eq!(ds.index(), &before);

    // The retry only uploads what is still missing.
    ws.remote.fail_uploads_matching(None);
    let report = ds.push_staged_images().unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn test_staging_rejects_non_images() {
    let ws = Workspace::new();
    let mut ds = ws.clone_dataset("wc");
    let good = ws.incoming_image("good.jpg", 1);
    let text = ws.base.join("incoming").join("notes.jpg");
    std::fs::write(&text, b"not a jpeg").unwrap();

    let err = ds.stage_local_images(&[good, text]).unwrap_err();
    assert!(matches!(err, ApiError::InvalidImage { .. }));
    assert!(ds.get_staged_images().is_empty());
}
