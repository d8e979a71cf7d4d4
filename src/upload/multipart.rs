//! Multipart upload planning and session state
//!
//! Pure part math plus the bookkeeping a chunked upload carries between
//! initiate and complete. The engine drives the actual part loop.

use std::time::Duration;

use crate::backend::CompletedPart;
use crate::config::RetryConfig;

/// Minimum part size accepted by the major vendors (5MiB)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum parts allowed per upload session
pub const MAX_PARTS: u64 = 10000;

/// One planned slice of the source file
///
/// Part numbers are 1-based and dense. Every part is exactly the configured
/// part size except the last, which may be smaller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub part_number: u32,
    pub offset: u64,
    pub len: u64,
}

/// Number of parts needed for `total_size` bytes at `part_size` per part
pub fn part_count(total_size: u64, part_size: u64) -> u64 {
    total_size.div_ceil(part_size)
}

/// Split `total_size` bytes into parts of `part_size`
///
/// The returned ranges partition `[0, total_size)` exactly; an empty input
/// yields no parts (vendors require at least one part, so the engine routes
/// empty payloads through the single-shot path instead).
pub fn plan_parts(total_size: u64, part_size: u64) -> Vec<PartSpec> {
    assert!(part_size > 0, "part_size must be non-zero");

    (0..part_count(total_size, part_size))
        .map(|i| {
            let offset = i * part_size;
            PartSpec {
                part_number: (i + 1) as u32,
                offset,
                len: part_size.min(total_size - offset),
            }
        })
        .collect()
}

/// Multipart session state
///
/// Created by initiate, appended per successful part, consumed by complete
/// or abort. Exclusively owned by the upload call that created it.
#[derive(Debug)]
pub struct UploadSession {
    pub upload_id: String,
    pub key: String,
    pub parts: Vec<CompletedPart>,
}

impl UploadSession {
    pub fn new(key: &str, upload_id: String) -> Self {
        Self {
            upload_id,
            key: key.to_string(),
            parts: Vec::new(),
        }
    }
}

/// Bounded per-part retry with linear backoff
///
/// Only transport errors are retried; vendor rejections and missing-resource
/// errors fail immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub(crate) fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
