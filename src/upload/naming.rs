//! Collision-safe object key resolution
//!
//! A desired key that already exists in the bucket falls back to a random
//! 16-character alphanumeric name carrying the original suffix. The fallback
//! is not re-checked for collisions; with 62^16 possible names an accidental
//! clash is not a practical concern.

use rand::{distr::Alphanumeric, Rng};

use crate::backend::{BackendError, StorageBackend};

/// Length of the random portion of fallback names
const FALLBACK_NAME_LEN: usize = 16;

/// Resolve a collision-free key for `desired`
///
/// Returns `desired` unchanged when no object with that key exists. Errors
/// from the existence probe propagate unchanged.
pub async fn resolve_key(
    backend: &dyn StorageBackend,
    desired: &str,
) -> Result<String, BackendError> {
    if !backend.object_exists(desired).await? {
        return Ok(desired.to_string());
    }

    let fallback = format!("{}{}", random_alphanumeric(FALLBACK_NAME_LEN), suffix_of(desired));
    tracing::debug!(
        desired = %desired,
        fallback = %fallback,
        "Desired key taken, using random fallback name"
    );
    Ok(fallback)
}

/// Suffix of a key's file name component, leading dot included
///
/// `"media/video.mp4"` yields `".mp4"`; dotless names yield `""`.
pub(crate) fn suffix_of(key: &str) -> &str {
    let file_start = key.rfind('/').map_or(0, |i| i + 1);
    let file_name = &key[file_start..];
    match file_name.rfind('.') {
        Some(i) => &file_name[i..],
        None => "",
    }
}

/// File name component of a key, directories stripped
pub(crate) fn file_name_of(key: &str) -> &str {
    key.rfind('/').map_or(key, |i| &key[i + 1..])
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use bytes::Bytes;

    #[test]
    fn test_suffix_of() {
        assert_eq!(suffix_of("video.mp4"), ".mp4");
        assert_eq!(suffix_of("media/video.mp4"), ".mp4");
        assert_eq!(suffix_of("archive.tar.gz"), ".gz");
        assert_eq!(suffix_of("plain"), "");
        assert_eq!(suffix_of("dir.v2/plain"), "");
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("media/2021/video.mp4"), "video.mp4");
        assert_eq!(file_name_of("video.mp4"), "video.mp4");
    }

    #[test]
    fn test_random_alphanumeric_shape() {
        let name = random_alphanumeric(16);
        assert_eq!(name.len(), 16);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_resolve_returns_free_key_unchanged() {
        let backend = MemoryBackend::new("media");
        let key = resolve_key(&backend, "video.mp4").await.unwrap();
        assert_eq!(key, "video.mp4");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_collision() {
        let backend = MemoryBackend::new("media");
        backend
            .put_object("video.mp4", Bytes::from("taken"))
            .await
            .unwrap();

        let key = resolve_key(&backend, "video.mp4").await.unwrap();
        assert_ne!(key, "video.mp4");

        let pattern = regex_lite::Regex::new(r"^[A-Za-z0-9]{16}\.mp4$").unwrap();
        assert!(pattern.is_match(&key), "unexpected fallback key: {}", key);
    }

    #[tokio::test]
    async fn test_resolve_fallback_keeps_no_suffix_for_dotless_keys() {
        let backend = MemoryBackend::new("media");
        backend.put_object("blob", Bytes::from("taken")).await.unwrap();

        let key = resolve_key(&backend, "blob").await.unwrap();
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
