//! Files replaced under a tracked path

mod common;

use bytes::Bytes;
use common::Harness;
use objstore::ObjectStore;
use sd_core::{Manifest, StreamId};
use std::path::Path;
use std::time::Duration;
use watcher::{FileChangeHandler, FileEvent, FileEventKind};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn manifest_for(h: &Harness, id: &StreamId) -> Manifest {
    let body = h.objects.get_object(&id.manifest_key()).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn rewrite(h: &Harness, path: &Path, content: &[u8]) {
    std::fs::remove_file(path).unwrap();
    h.write(path.file_name().unwrap().to_str().unwrap(), content);
}

#[tokio::test]
async fn test_replace_with_shorter_uploads_new_content() {
    let h = Harness::new(4, TIMEOUT);
    let path = h.write("cam.mp4", b"ABCDEFGHIJKL");
    let key = h.key(&path);
    let id = StreamId::for_path(&key);
    let coordinator = h.coordinator(false);
    coordinator.on_file_changed(FileEvent::modified(&path)).await;
    assert_eq!(h.checkpoints.get_offset(&key).await.unwrap(), 12);

    rewrite(&h, &path, b"WXYZ");
    coordinator
        .on_file_changed(FileEvent::new(&path, FileEventKind::Deleted, false))
        .await;
    coordinator
        .on_file_changed(FileEvent::new(&path, FileEventKind::Created, false))
        .await;

    assert_eq!(h.checkpoints.get_offset(&key).await.unwrap(), 4);
    assert_eq!(h.checkpoints.get_stream_id(&key).await.unwrap(), Some(id.clone()));
    assert_eq!(h.objects.object(&id.chunk_key(0)).unwrap(), Bytes::from_static(b"WXYZ"));

    let now = h.age(&path, 6.0).await;
    assert_eq!(h.monitor.check_streams_at(now).await.finalized, vec![key]);

    let manifest = manifest_for(&h, &id).await;
    assert_eq!(manifest.chunks, vec![id.chunk_key(0)]);
    assert_eq!(manifest.file_size, 4);
}

#[tokio::test]
async fn test_replace_after_finalize_lists_only_current_chunks() {
    let h = Harness::new(4, TIMEOUT);
    let path = h.write("cam.mp4", b"ABCDEFGHIJKL");
    let key = h.key(&path);
    let id = StreamId::for_path(&key);
    let coordinator = h.coordinator(false);
    coordinator.on_file_changed(FileEvent::modified(&path)).await;

    let now = h.age(&path, 6.0).await;
    assert_eq!(h.monitor.check_streams_at(now).await.finalized.len(), 1);
    assert_eq!(manifest_for(&h, &id).await.chunks.len(), 3);

    rewrite(&h, &path, b"WXYZ12");
    coordinator
        .on_file_changed(FileEvent::new(&path, FileEventKind::Created, false))
        .await;
    assert_eq!(h.checkpoints.get_offset(&key).await.unwrap(), 6);
    assert_eq!(h.objects.object(&id.chunk_key(0)).unwrap(), Bytes::from_static(b"WXYZ"));
    assert_eq!(h.objects.object(&id.chunk_key(1)).unwrap(), Bytes::from_static(b"12"));

    let now = h.age(&path, 6.0).await;
    assert_eq!(h.monitor.check_streams_at(now).await.finalized, vec![key]);

    // chunk_000002.bin from the old contents is still stored but not listed
    assert!(h.objects.object(&id.chunk_key(2)).is_some());
    let manifest = manifest_for(&h, &id).await;
    assert_eq!(manifest.chunks, vec![id.chunk_key(0), id.chunk_key(1)]);
    assert_eq!(manifest.file_size, 6);
}
