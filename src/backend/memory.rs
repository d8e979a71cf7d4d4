//! In-memory backend
//!
//! Backs tests and local development. Behaves like a strict vendor: parts
//! are reassembled by part number regardless of upload order, and completion
//! validates every submitted etag against what was actually uploaded.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{BackendError, CompletedPart, StorageBackend};

const VENDOR: &str = "memory";

#[derive(Default, Debug)]
struct Store {
    objects: HashMap<String, Bytes>,
    sessions: HashMap<String, Session>,
}

#[derive(Debug)]
struct Session {
    key: String,
    // part number -> (etag, data); BTreeMap keeps assembly order by part number
    parts: BTreeMap<u32, (String, Bytes)>,
}

/// In-memory storage backend
#[derive(Debug)]
pub struct MemoryBackend {
    bucket: String,
    bucket_present: bool,
    store: Mutex<Store>,
}

impl MemoryBackend {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            bucket_present: true,
            store: Mutex::new(Store::default()),
        }
    }

    /// Backend whose bucket does not exist; `bucket_exists` reports false
    pub fn without_bucket(bucket: &str) -> Self {
        Self {
            bucket_present: false,
            ..Self::new(bucket)
        }
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.store.lock().objects.len()
    }

    /// Number of multipart sessions neither completed nor aborted
    pub fn open_sessions(&self) -> usize {
        self.store.lock().sessions.len()
    }

    fn rejected(&self, message: String) -> BackendError {
        BackendError::Rejected {
            vendor: VENDOR,
            message,
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn vendor(&self) -> &'static str {
        VENDOR
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, BackendError> {
        Ok(self.bucket_present)
    }

    async fn object_exists(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.store.lock().objects.contains_key(key))
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), BackendError> {
        self.store.lock().objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError> {
        self.store
            .lock()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::ObjectNotFound {
                vendor: VENDOR,
                key: key.to_string(),
            })
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        self.store.lock().objects.remove(key);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String, BackendError> {
        let upload_id = Uuid::new_v4().to_string();
        self.store.lock().sessions.insert(
            upload_id.clone(),
            Session {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<CompletedPart, BackendError> {
        let mut store = self.store.lock();
        let session = store
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| self.rejected(format!("no such upload: {}", upload_id)))?;

        let etag = format!("\"part-{}\"", Uuid::new_v4());
        session
            .parts
            .insert(part_number, (etag.clone(), body));

        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), BackendError> {
        let mut store = self.store.lock();
        let session = store
            .sessions
            .get(upload_id)
            .ok_or_else(|| self.rejected(format!("no such upload: {}", upload_id)))?;

        if parts.len() != session.parts.len() {
            return Err(self.rejected(format!(
                "completion names {} parts but {} were uploaded",
                parts.len(),
                session.parts.len()
            )));
        }
        for part in parts {
            match session.parts.get(&part.part_number) {
                Some((etag, _)) if *etag == part.etag => {}
                Some(_) => {
                    return Err(
                        self.rejected(format!("etag mismatch for part {}", part.part_number))
                    )
                }
                None => {
                    return Err(self.rejected(format!("part {} was never uploaded", part.part_number)))
                }
            }
        }

        // Assemble strictly by part number; upload order is irrelevant
        let session = store.sessions.remove(upload_id).unwrap();
        let mut assembled = Vec::new();
        for (_, (_, data)) in &session.parts {
            assembled.extend_from_slice(data);
        }
        store.objects.insert(session.key, Bytes::from(assembled));

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), BackendError> {
        self.store.lock().sessions.remove(upload_id);
        Ok(())
    }
}
