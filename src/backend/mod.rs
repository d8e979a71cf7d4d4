//! Storage backend abstraction
//!
//! One trait, one implementing type per vendor, selected at configuration
//! time. The upload engine only ever talks to `dyn StorageBackend`.
//!
//! # Design
//!
//! - Each backend owns exactly one bucket; the engine re-checks bucket
//!   existence per top-level operation rather than caching it
//! - Parts may reach a backend out of order; reassembly is strictly by
//!   part number
//! - Every error carries the vendor tag so callers can tell which storage
//!   type failed

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::config::StorageConfig;

pub mod memory;
pub mod s3;

/// Errors surfaced by storage backends
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("[{vendor}] storage is not configured: {reason}")]
    NotConfigured {
        vendor: &'static str,
        reason: String,
    },

    #[error("[{vendor}] bucket not found: {bucket}")]
    BucketNotFound {
        vendor: &'static str,
        bucket: String,
    },

    #[error("[{vendor}] object not found: {key}")]
    ObjectNotFound { vendor: &'static str, key: String },

    #[error("[{vendor}] transport error: {message}")]
    Transport {
        vendor: &'static str,
        message: String,
    },

    #[error("[{vendor}] rejected by vendor: {message}")]
    Rejected {
        vendor: &'static str,
        message: String,
    },
}

/// Etag handed back by the vendor for a successfully uploaded part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number, dense within a session
    pub part_number: u32,
    pub etag: String,
}

/// Vendor-agnostic object storage operations
///
/// Implementations must be safe to share across tasks; the engine wraps them
/// in `Arc` and never assumes per-call connection state.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Short vendor tag used in errors, logs, and metrics
    fn vendor(&self) -> &'static str;

    /// Bucket this backend is bound to
    fn bucket(&self) -> &str;

    async fn bucket_exists(&self) -> Result<bool, BackendError>;

    async fn object_exists(&self, key: &str) -> Result<bool, BackendError>;

    /// Create or overwrite the object at `key` in one request
    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), BackendError>;

    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError>;

    async fn delete_object(&self, key: &str) -> Result<(), BackendError>;

    /// Open a multipart session; returns the vendor-assigned opaque upload id
    async fn create_multipart_upload(&self, key: &str) -> Result<String, BackendError>;

    /// Upload one part. `part_number` is 1-based; vendors accept 1..=10000.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<CompletedPart, BackendError>;

    /// Finalize a session. The vendor validates every etag; a mismatch
    /// surfaces as `Rejected`.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), BackendError>;

    /// Discard a session and any parts uploaded into it
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str)
        -> Result<(), BackendError>;
}

/// Select a backend implementation from configuration
///
/// Fails with `NotConfigured` before any network call when a required
/// credential field is missing.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, BackendError> {
    match config.vendor.as_str() {
        "s3" => Ok(Arc::new(s3::S3Backend::from_config(config)?)),
        "memory" => Ok(Arc::new(memory::MemoryBackend::new(&config.bucket))),
        other => Err(BackendError::NotConfigured {
            vendor: "storage",
            reason: format!("unknown storage vendor '{}'", other),
        }),
    }
}
