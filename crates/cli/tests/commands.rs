//! End-to-end runs of the operator subcommands

mod common;

use common::sled_url;
use journal::CheckpointStore;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_reflects_environment_and_hides_secret() {
    let dir = TempDir::new().unwrap();
    let result = sd!(dir.path(), "config")
        .env("CHUNK_SIZE", "4096")
        .env("S3_SECRET_KEY", "hunter2")
        .assert_success();

    assert!(result.stdout.contains("chunk_size = 4096"));
    assert!(result.stdout.contains("file_suffix = \".mp4\""));
    assert!(!result.stdout.contains("hunter2"));
}

#[test]
fn test_flag_overrides_environment() {
    let dir = TempDir::new().unwrap();
    let result = sd!(dir.path(), "--chunk-size", "512", "config")
        .env("CHUNK_SIZE", "4096")
        .assert_success();

    assert!(result.stdout.contains("chunk_size = 512"));
}

#[test]
fn test_settings_file_is_read() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("streamdrop.toml"), "s3_bucket = \"recordings\"\n").unwrap();

    let result = sd!(dir.path(), "config").assert_success();
    assert!(result.stdout.contains("s3_bucket = \"recordings\""));
}

#[test]
fn test_invalid_settings_fail() {
    let dir = TempDir::new().unwrap();
    let result = sd!(dir.path(), "config").env("CHUNK_SIZE", "0").assert_failure();
    assert!(result.stderr.contains("chunk_size"));
}

#[test]
fn test_status_without_streams() {
    let dir = TempDir::new().unwrap();
    let result = sd!(dir.path(), "status").assert_success();

    assert!(result.stdout.contains("Not running"));
    assert!(result.stdout.contains("No tracked streams"));
}

#[test]
fn test_untracked_file_cannot_be_finalized_or_forgotten() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("cam.mp4");
    std::fs::write(&file, b"ABCD").unwrap();
    let file = file.to_str().unwrap();

    let result = sd!(dir.path(), "finalize", file).assert_failure();
    assert!(result.stderr.contains("not tracked"));

    let result = sd!(dir.path(), "forget", file).assert_success();
    assert!(result.stdout.contains("No checkpoint"));
}

#[tokio::test]
async fn test_status_and_forget_tracked_stream() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("cam.mp4");
    std::fs::write(&file, b"ABCDEFGH").unwrap();
    let file = file.canonicalize().unwrap();
    let key = file.to_string_lossy().into_owned();

    {
        let store = CheckpointStore::open(&sled_url(dir.path()), Duration::from_secs(3600))
            .await
            .unwrap();
        store.get_or_create_stream_id(&key).await.unwrap();
        store.set_offset(&key, 4).await.unwrap();
        store.touch_activity(&key).await.unwrap();
    }

    let result = sd!(dir.path(), "status").assert_success();
    assert!(result.stdout.contains("Streams (1)"));
    assert!(result.stdout.contains(&key));
    assert!(result.stdout.contains("uploading"));

    // Bytes 4..8 are not uploaded, so finalization refuses
    let result = sd!(dir.path(), "finalize", &key).assert_failure();
    assert!(result.stderr.contains("not uploaded"));

    let result = sd!(dir.path(), "forget", &key).assert_success();
    assert!(result.stdout.contains("Forgot"));

    let result = sd!(dir.path(), "status").assert_success();
    assert!(result.stdout.contains("No tracked streams"));
}
