//! Progress observation
//!
//! Implemented by the caller (UI, CLI, job runner); the engine only notifies.

use super::StoredFile;

/// Observer for chunked uploads
///
/// `part_done` receives the 0-based loop index and is invoked in ascending
/// part order; the engine serializes notifications even though the wire
/// protocol would permit out-of-order parts.
pub trait ProgressSink: Send + Sync {
    /// A chunked upload began for the resolved key
    fn started(&self, key: &str);

    /// One part finished; `part_index` is 0-based
    fn part_done(&self, part_index: u32, total_parts: u32);

    /// The upload completed; the result is about to be returned
    fn finished(&self, result: &StoredFile);
}

/// Sink that ignores every notification
#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn started(&self, _key: &str) {}
    fn part_done(&self, _part_index: u32, _total_parts: u32) {}
    fn finished(&self, _result: &StoredFile) {}
}

/// Sink that logs progress through `tracing`
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn started(&self, key: &str) {
        tracing::info!(key = %key, "Chunked upload started");
    }

    fn part_done(&self, part_index: u32, total_parts: u32) {
        tracing::info!(
            part = part_index + 1,
            total_parts = total_parts,
            "Part uploaded"
        );
    }

    fn finished(&self, result: &StoredFile) {
        tracing::info!(
            stored_path = %result.stored_path,
            full_url = %result.full_url,
            "Chunked upload finished"
        );
    }
}
