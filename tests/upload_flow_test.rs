//! End-to-end upload flows driven against the in-memory backend

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::RngCore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use kura_uploadr::backend::memory::MemoryBackend;
use kura_uploadr::backend::{self, BackendError, CompletedPart, StorageBackend};
use kura_uploadr::config::StorageConfig;
use kura_uploadr::upload::engine::Uploader;
use kura_uploadr::upload::multipart::RetryPolicy;
use kura_uploadr::upload::progress::ProgressSink;
use kura_uploadr::upload::StoredFile;
use kura_uploadr::UploadError;

const MIB: u64 = 1024 * 1024;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    buf
}

fn write_temp_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Progress sink that records every notification in order
#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn started(&self, key: &str) {
        self.events.lock().push(format!("start:{}", key));
    }

    fn part_done(&self, part_index: u32, total_parts: u32) {
        self.events
            .lock()
            .push(format!("part:{}/{}", part_index, total_parts));
    }

    fn finished(&self, result: &StoredFile) {
        self.events.lock().push(format!("end:{}", result.stored_path));
    }
}

/// Backend wrapper injecting transport failures into one part number
#[derive(Debug)]
struct FlakyBackend {
    inner: Arc<MemoryBackend>,
    fail_part: u32,
    failures_left: Mutex<u32>,
}

impl FlakyBackend {
    fn new(inner: Arc<MemoryBackend>, fail_part: u32, failures: u32) -> Self {
        Self {
            inner,
            fail_part,
            failures_left: Mutex::new(failures),
        }
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn vendor(&self) -> &'static str {
        self.inner.vendor()
    }

    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn bucket_exists(&self) -> Result<bool, BackendError> {
        self.inner.bucket_exists().await
    }

    async fn object_exists(&self, key: &str) -> Result<bool, BackendError> {
        self.inner.object_exists(key).await
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), BackendError> {
        self.inner.put_object(key, body).await
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError> {
        self.inner.get_object(key).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        self.inner.delete_object(key).await
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String, BackendError> {
        self.inner.create_multipart_upload(key).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<CompletedPart, BackendError> {
        if part_number == self.fail_part {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(BackendError::Transport {
                    vendor: "memory",
                    message: "injected connection reset".into(),
                });
            }
        }
        self.inner.upload_part(key, upload_id, part_number, body).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), BackendError> {
        self.inner
            .complete_multipart_upload(key, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), BackendError> {
        self.inner.abort_multipart_upload(key, upload_id).await
    }
}

fn no_backoff() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        backoff: Duration::ZERO,
    }
}

#[tokio::test]
async fn multipart_upload_reports_progress_and_roundtrips() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let payload = random_bytes((12 * MIB) as usize);
    let path = write_temp_file(&dir, "movie.mp4", &payload);

    let backend = Arc::new(MemoryBackend::new("media"));
    let progress = Arc::new(RecordingProgress::default());
    let uploader = Uploader::new(backend.clone(), "https://cdn.example.com/")
        .with_progress(progress.clone());

    let stored = uploader.upload_file(&path, "movie.mp4").await.unwrap();

    // 12MiB at 5MiB parts: [5MiB, 5MiB, 2MiB]
    assert_eq!(stored.stored_path, "movie.mp4");
    assert_eq!(stored.suffix, ".mp4");
    assert_eq!(stored.full_url, "https://cdn.example.com/movie.mp4");
    assert!(stored.content_hash.is_none());

    assert_eq!(
        progress.events(),
        vec![
            "start:movie.mp4",
            "part:0/3",
            "part:1/3",
            "part:2/3",
            "end:movie.mp4",
        ]
    );

    let body = uploader.download("movie.mp4").await.unwrap();
    assert_eq!(body.as_ref(), payload.as_slice());
    assert_eq!(backend.open_sessions(), 0);
}

#[tokio::test]
async fn uploads_roundtrip_across_size_boundaries() {
    const C: u64 = 1024;
    init_tracing();
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new("media"));
    let uploader = Uploader::new(backend, "https://cdn.example.com/")
        .with_multipart_threshold(0)
        .with_part_size(C);

    for (i, size) in [0, 1, C - 1, C, C + 1, 5 * C + 7].into_iter().enumerate() {
        let key = format!("payload-{}.bin", i);
        let payload = random_bytes(size as usize);
        let path = write_temp_file(&dir, &key, &payload);

        let stored = uploader.upload_file(&path, &key).await.unwrap();
        assert_eq!(stored.stored_path, key);

        let body = uploader.download(&key).await.unwrap();
        assert_eq!(body.as_ref(), payload.as_slice(), "size {} roundtrip", size);
    }
}

#[tokio::test]
async fn small_file_takes_single_shot_path_with_hash() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let payload = b"tiny".to_vec();
    let path = write_temp_file(&dir, "tiny.txt", &payload);

    let progress = Arc::new(RecordingProgress::default());
    let uploader = Uploader::new(
        Arc::new(MemoryBackend::new("media")),
        "https://cdn.example.com/",
    )
    .with_progress(progress.clone());

    let stored = uploader.upload_file(&path, "tiny.txt").await.unwrap();

    assert!(stored.content_hash.is_some());
    // The single-shot path does not notify the progress sink
    assert!(progress.events().is_empty());
}

#[tokio::test]
async fn collision_falls_back_to_random_name() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new("media"));
    backend
        .put_object("video.mp4", Bytes::from("already here"))
        .await
        .unwrap();

    let uploader = Uploader::new(backend.clone(), "https://cdn.example.com/");
    let stored = uploader
        .upload_stream(&b"new upload"[..], "video.mp4")
        .await
        .unwrap();

    let pattern = regex_lite::Regex::new(r"^[A-Za-z0-9]{16}\.mp4$").unwrap();
    assert!(
        pattern.is_match(&stored.stored_path),
        "unexpected fallback key: {}",
        stored.stored_path
    );

    // The original object is untouched
    let original = backend.get_object("video.mp4").await.unwrap();
    assert_eq!(original.as_ref(), b"already here");
}

#[tokio::test]
async fn failing_part_aborts_the_session_without_completing() {
    const C: u64 = 1024;
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = write_temp_file(&dir, "big.bin", &random_bytes((3 * C) as usize));

    let inner = Arc::new(MemoryBackend::new("media"));
    // Part 2 fails on every attempt
    let backend = Arc::new(FlakyBackend::new(inner.clone(), 2, u32::MAX));
    let progress = Arc::new(RecordingProgress::default());
    let uploader = Uploader::new(backend, "https://cdn.example.com/")
        .with_multipart_threshold(0)
        .with_part_size(C)
        .with_retry(no_backoff())
        .with_progress(progress.clone());

    let err = uploader.upload_file(&path, "big.bin").await.unwrap_err();
    match err {
        UploadError::PartUploadFailed {
            part_number,
            total_parts,
            ..
        } => {
            assert_eq!(part_number, 2);
            assert_eq!(total_parts, 3);
        }
        other => panic!("expected PartUploadFailed, got {:?}", other),
    }

    // No completion happened and the session was aborted
    assert!(!inner.object_exists("big.bin").await.unwrap());
    assert_eq!(inner.open_sessions(), 0);
    assert_eq!(progress.events(), vec!["start:big.bin", "part:0/3"]);
}

#[tokio::test]
async fn transient_part_failure_is_retried() {
    const C: u64 = 1024;
    init_tracing();
    let dir = TempDir::new().unwrap();
    let payload = random_bytes((3 * C) as usize);
    let path = write_temp_file(&dir, "big.bin", &payload);

    let inner = Arc::new(MemoryBackend::new("media"));
    // Part 2 fails exactly once, then succeeds
    let backend = Arc::new(FlakyBackend::new(inner.clone(), 2, 1));
    let uploader = Uploader::new(backend, "https://cdn.example.com/")
        .with_multipart_threshold(0)
        .with_part_size(C)
        .with_retry(no_backoff());

    let stored = uploader.upload_file(&path, "big.bin").await.unwrap();
    assert_eq!(stored.stored_path, "big.bin");

    let body = inner.get_object("big.bin").await.unwrap();
    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn cancellation_aborts_the_session() {
    const C: u64 = 1024;
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = write_temp_file(&dir, "big.bin", &random_bytes((3 * C) as usize));

    let inner = Arc::new(MemoryBackend::new("media"));
    let uploader = Uploader::new(inner.clone(), "https://cdn.example.com/")
        .with_multipart_threshold(0)
        .with_part_size(C);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = uploader
        .upload_file_with_cancel(&path, "big.bin", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Cancelled));
    assert_eq!(inner.open_sessions(), 0);
    assert!(!inner.object_exists("big.bin").await.unwrap());
}

#[test]
fn missing_credentials_fail_before_any_network_call() {
    let config = StorageConfig {
        vendor: "s3".into(),
        bucket: "media".into(),
        region: Some("us-east-1".into()),
        endpoint: Some("http://localhost:9000".into()),
        access_key: None,
        secret_key: None,
        public_url_prefix: "https://cdn.example.com/".into(),
    };

    // No runtime, no sockets: construction alone must reject the config
    let err = backend::from_config(&config).unwrap_err();
    assert!(matches!(err, BackendError::NotConfigured { .. }));
}
