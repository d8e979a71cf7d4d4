//! Upload engine
//!
//! Drives the full upload flow against a pluggable backend: bucket
//! precondition, collision-safe name resolution, single-shot vs chunked path
//! selection by size threshold, the sequential part loop with bounded retry,
//! and assembly of the immutable result value.
//!
//! # Example
//!
//! ```no_run
//! use kura_uploadr::backend::memory::MemoryBackend;
//! use kura_uploadr::upload::engine::Uploader;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(MemoryBackend::new("media"));
//! let uploader = Uploader::new(backend, "https://cdn.example.com/");
//!
//! let stored = uploader.upload_file("video.mp4".as_ref(), "video.mp4").await?;
//! println!("Stored at {}", stored.full_url);
//! # Ok(())
//! # }
//! ```

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use super::multipart::{self, PartSpec, RetryPolicy, UploadSession};
use super::naming;
use super::progress::{NoopProgress, ProgressSink};
use super::{StoredFile, UploadError};
use crate::backend::{BackendError, CompletedPart, StorageBackend};
use crate::config::UploadConfig;
use crate::metrics;

/// Characters escaped when the stored path is embedded in the public URL
const URL_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?');

/// Read granularity for the single-shot hash-and-buffer pass
const READ_CHUNK: usize = 64 * 1024;

/// Vendor-agnostic upload engine
///
/// One instance per bucket; safe to share across tasks. Every top-level
/// operation re-checks bucket existence rather than caching it.
pub struct Uploader {
    backend: Arc<dyn StorageBackend>,
    multipart_threshold: u64,
    part_size: u64,
    retry: RetryPolicy,
    url_prefix: String,
    progress: Arc<dyn ProgressSink>,
}

impl Uploader {
    /// Create an engine with default upload settings and no progress sink
    pub fn new(backend: Arc<dyn StorageBackend>, url_prefix: impl Into<String>) -> Self {
        let defaults = UploadConfig::default();
        Self {
            backend,
            multipart_threshold: defaults.multipart_threshold,
            part_size: defaults.part_size,
            retry: RetryPolicy::from_config(&defaults.retry),
            url_prefix: url_prefix.into(),
            progress: Arc::new(NoopProgress),
        }
    }

    /// Apply upload settings from configuration
    pub fn with_upload_config(mut self, config: &UploadConfig) -> Self {
        self.multipart_threshold = config.multipart_threshold;
        self.part_size = config.part_size;
        self.retry = RetryPolicy::from_config(&config.retry);
        self
    }

    /// Override part size directly; config validation enforces the vendor
    /// minimum, this does not
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        assert!(part_size > 0, "part_size must be non-zero");
        self.part_size = part_size;
        self
    }

    /// Override the multipart threshold directly
    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a progress sink observing chunked uploads
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Upload a stream in a single request
    ///
    /// The stream is read once; the same pass feeds the content hasher and
    /// the upload buffer, so the result carries a SHA-256 hash without a
    /// second read of the source.
    #[tracing::instrument(
        name = "upload.stream",
        skip(self, reader),
        fields(bucket = %self.backend.bucket(), desired_key = %desired_key),
        err
    )]
    pub async fn upload_stream<R>(
        &self,
        mut reader: R,
        desired_key: &str,
    ) -> Result<StoredFile, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ensure_bucket().await?;
        let key = naming::resolve_key(self.backend.as_ref(), desired_key).await?;

        let started_at = Utc::now();
        let start = Instant::now();

        let mut hasher = Sha256::new();
        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
            buffer.extend_from_slice(&chunk[..n]);
        }
        let size = buffer.len() as u64;

        let outcome = self.backend.put_object(&key, Bytes::from(buffer)).await;

        let bucket = self.backend.bucket();
        metrics::record_upload_duration(bucket, "put_object", start.elapsed().as_secs_f64());

        if let Err(err) = outcome {
            metrics::record_upload_failure(bucket);
            metrics::record_error("put_object");
            return Err(err.into());
        }
        metrics::record_upload_success(bucket, size);

        let content_hash = hex::encode(hasher.finalize());
        Ok(self.stored_file(desired_key, key, started_at, Some(content_hash)))
    }

    /// Upload a file, chunking it when it exceeds the multipart threshold
    pub async fn upload_file(
        &self,
        path: &Path,
        desired_key: &str,
    ) -> Result<StoredFile, UploadError> {
        self.upload_file_with_cancel(path, desired_key, &CancellationToken::new())
            .await
    }

    /// Upload a file with cooperative cancellation
    ///
    /// Cancellation is checked between parts; a cancelled upload aborts its
    /// multipart session and surfaces `Cancelled`.
    #[tracing::instrument(
        name = "upload.file",
        skip(self, path, cancel),
        fields(bucket = %self.backend.bucket(), desired_key = %desired_key),
        err
    )]
    pub async fn upload_file_with_cancel(
        &self,
        path: &Path,
        desired_key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredFile, UploadError> {
        self.ensure_bucket().await?;

        let size = tokio::fs::metadata(path).await?.len();
        if size <= self.multipart_threshold {
            // Small and empty payloads take the single-shot path; vendors
            // require at least one part per multipart session
            let file = File::open(path).await?;
            return self.upload_stream(file, desired_key).await;
        }

        let key = naming::resolve_key(self.backend.as_ref(), desired_key).await?;
        let bucket = self.backend.bucket();

        let started_at = Utc::now();
        let start = Instant::now();

        let plan = multipart::plan_parts(size, self.part_size);
        let total_parts = plan.len() as u32;

        let upload_id = self.backend.create_multipart_upload(&key).await?;
        let mut session = UploadSession::new(&key, upload_id);

        self.progress.started(&key);

        if let Err(err) = self.drive_parts(path, &plan, &mut session, cancel).await {
            self.abort_session(&session).await;
            metrics::record_multipart_upload_failure(bucket);
            return Err(err);
        }

        if let Err(err) = self
            .backend
            .complete_multipart_upload(&session.key, &session.upload_id, &session.parts)
            .await
        {
            self.abort_session(&session).await;
            metrics::record_multipart_upload_failure(bucket);
            metrics::record_error("complete_multipart_upload");
            return Err(UploadError::CompletionFailed(err.to_string()));
        }

        metrics::record_multipart_upload_success(bucket, total_parts as usize);
        metrics::record_upload_success(bucket, size);
        metrics::record_upload_duration(bucket, "multipart", start.elapsed().as_secs_f64());

        tracing::info!(
            key = %session.key,
            parts = total_parts,
            bytes = size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Multipart upload completed"
        );

        // Content hash is not computed on the chunked path
        let result = self.stored_file(desired_key, session.key, started_at, None);
        self.progress.finished(&result);
        Ok(result)
    }

    /// Download an object
    ///
    /// The object must exist; a missing key surfaces `ObjectNotFound`.
    #[tracing::instrument(
        name = "upload.download",
        skip(self),
        fields(bucket = %self.backend.bucket(), key = %key),
        err
    )]
    pub async fn download(&self, key: &str) -> Result<Bytes, UploadError> {
        if key.is_empty() {
            return Err(UploadError::EmptyKey);
        }
        self.ensure_bucket().await?;
        if !self.backend.object_exists(key).await? {
            return Err(self.object_not_found(key));
        }
        Ok(self.backend.get_object(key).await?)
    }

    /// Delete an object
    ///
    /// The object must exist; a missing key surfaces `ObjectNotFound`.
    #[tracing::instrument(
        name = "upload.delete",
        skip(self),
        fields(bucket = %self.backend.bucket(), key = %key),
        err
    )]
    pub async fn delete(&self, key: &str) -> Result<(), UploadError> {
        if key.is_empty() {
            return Err(UploadError::EmptyKey);
        }
        self.ensure_bucket().await?;
        if !self.backend.object_exists(key).await? {
            return Err(self.object_not_found(key));
        }
        self.backend.delete_object(key).await?;
        Ok(())
    }

    async fn drive_parts(
        &self,
        path: &Path,
        plan: &[PartSpec],
        session: &mut UploadSession,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        let total_parts = plan.len() as u32;
        let mut file = File::open(path).await?;

        for (index, spec) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            file.seek(SeekFrom::Start(spec.offset)).await?;
            let mut buf = vec![0u8; spec.len as usize];
            file.read_exact(&mut buf).await?;

            let part = self
                .upload_part_with_retry(session, spec, Bytes::from(buf), total_parts)
                .await?;
            session.parts.push(part);

            self.progress.part_done(index as u32, total_parts);
        }

        Ok(())
    }

    async fn upload_part_with_retry(
        &self,
        session: &UploadSession,
        spec: &PartSpec,
        body: Bytes,
        total_parts: u32,
    ) -> Result<CompletedPart, UploadError> {
        let mut attempt = 1u32;
        loop {
            match self
                .backend
                .upload_part(&session.key, &session.upload_id, spec.part_number, body.clone())
                .await
            {
                Ok(part) => return Ok(part),
                Err(err) => {
                    let retryable = matches!(err, BackendError::Transport { .. });
                    if retryable && attempt < self.retry.max_attempts {
                        tracing::warn!(
                            part_number = spec.part_number,
                            attempt = attempt,
                            error = %err,
                            "Part upload failed, retrying"
                        );
                        tokio::time::sleep(self.retry.backoff_after(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    metrics::record_error("upload_part");
                    return Err(UploadError::PartUploadFailed {
                        part_number: spec.part_number,
                        total_parts,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// Best-effort abort; a failure is logged and never masks the error that
    /// got us here
    async fn abort_session(&self, session: &UploadSession) {
        if let Err(err) = self
            .backend
            .abort_multipart_upload(&session.key, &session.upload_id)
            .await
        {
            tracing::warn!(
                key = %session.key,
                upload_id = %session.upload_id,
                error = %err,
                "Failed to abort multipart session; vendor-side parts may linger"
            );
        }
    }

    async fn ensure_bucket(&self) -> Result<(), UploadError> {
        if !self.backend.bucket_exists().await? {
            return Err(BackendError::BucketNotFound {
                vendor: self.backend.vendor(),
                bucket: self.backend.bucket().to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn object_not_found(&self, key: &str) -> UploadError {
        BackendError::ObjectNotFound {
            vendor: self.backend.vendor(),
            key: key.to_string(),
        }
        .into()
    }

    fn stored_file(
        &self,
        desired_key: &str,
        key: String,
        started_at: DateTime<Utc>,
        content_hash: Option<String>,
    ) -> StoredFile {
        StoredFile {
            original_name: naming::file_name_of(desired_key).to_string(),
            suffix: naming::suffix_of(&key).to_string(),
            started_at,
            finished_at: Utc::now(),
            full_url: self.public_url(&key),
            stored_path: key,
            content_hash,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.url_prefix, utf8_percent_encode(key, URL_UNSAFE))
    }
}
