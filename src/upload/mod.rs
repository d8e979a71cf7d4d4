//! Upload module
//!
//! Orchestrates object-storage uploads over a pluggable backend: collision
//! safe naming, single-shot and chunked paths, progress observation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;

pub mod engine;
pub mod multipart;
pub mod naming;
pub mod progress;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("part {part_number}/{total_parts} upload failed: {message}")]
    PartUploadFailed {
        /// 1-based part number, matching the wire protocol
        part_number: u32,
        total_parts: u32,
        message: String,
    },

    #[error("multipart completion failed: {0}")]
    CompletionFailed(String),

    #[error("object key is empty")]
    EmptyKey,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload cancelled")]
    Cancelled,
}

/// Description of a stored file, returned to the caller
///
/// Immutable once constructed. `content_hash` is only computed on the
/// single-shot path; chunked uploads leave it `None`.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    /// File name the caller asked for, without any directory prefix
    pub original_name: String,
    /// Suffix of the stored key, leading dot included; empty if none
    pub suffix: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Final object key after collision resolution
    pub stored_path: String,
    /// Hex-encoded SHA-256 of the payload, when computed
    pub content_hash: Option<String>,
    /// Public URL: configured prefix + encoded stored path
    pub full_url: String,
}
