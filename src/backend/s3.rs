//! S3 reference backend
//!
//! Works against AWS S3 and S3-compatible vendors (Aliyun OSS, MinIO,
//! Cloudflare R2) through the AWS SDK. S3-compatible vendors are reached by
//! setting `endpoint` in the storage configuration, which also switches the
//! client to path-style addressing.
//!
//! The SDK client is built once per backend and reused; it pools HTTP
//! connections internally, so individual operations never construct or tear
//! down vendor sessions themselves.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::{BackendError, CompletedPart, StorageBackend};
use crate::config::StorageConfig;

const VENDOR: &str = "s3";

/// Default region for S3-compatible vendors that ignore the value
const DEFAULT_REGION: &str = "us-east-1";

/// S3 storage backend
#[derive(Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    /// Build a backend from configuration
    ///
    /// Fails with `NotConfigured` before any network call when the access
    /// key, secret key, or bucket is missing.
    pub fn from_config(config: &StorageConfig) -> Result<Self, BackendError> {
        let access_key = require(&config.access_key, "access_key")?;
        let secret_key = require(&config.secret_key, "secret_key")?;
        if config.bucket.trim().is_empty() {
            return Err(not_configured("bucket is not set"));
        }

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let credentials = Credentials::new(access_key, secret_key, None, None, "kura-config");

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            // S3-compatible vendors generally require path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    fn transport(&self, operation: &str, err: impl std::fmt::Display) -> BackendError {
        BackendError::Transport {
            vendor: VENDOR,
            message: format!("{}: {}", operation, err),
        }
    }
}

fn require<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, BackendError> {
    match field.as_deref() {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(not_configured(&format!("{} is not set", name))),
    }
}

fn not_configured(reason: &str) -> BackendError {
    BackendError::NotConfigured {
        vendor: VENDOR,
        reason: reason.to_string(),
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn vendor(&self) -> &'static str {
        VENDOR
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[tracing::instrument(name = "storage.bucket_exists", skip(self), fields(s3.bucket = %self.bucket), err)]
    async fn bucket_exists(&self) -> Result<bool, BackendError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadBucketError::is_not_found)
                {
                    return Ok(false);
                }
                Err(self.transport("HeadBucket", DisplayErrorContext(&err)))
            }
        }
    }

    #[tracing::instrument(name = "storage.object_exists", skip(self), fields(s3.bucket = %self.bucket, s3.key = %key), err)]
    async fn object_exists(&self, key: &str) -> Result<bool, BackendError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    return Ok(false);
                }
                Err(self.transport("HeadObject", DisplayErrorContext(&err)))
            }
        }
    }

    #[tracing::instrument(
        name = "storage.put_object",
        skip(self, body),
        fields(s3.bucket = %self.bucket, s3.key = %key, upload.bytes = body.len()),
        err
    )]
    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), BackendError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| self.transport("PutObject", DisplayErrorContext(&err)))?;
        Ok(())
    }

    #[tracing::instrument(name = "storage.get_object", skip(self), fields(s3.bucket = %self.bucket, s3.key = %key), err)]
    async fn get_object(&self, key: &str) -> Result<Bytes, BackendError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    BackendError::ObjectNotFound {
                        vendor: VENDOR,
                        key: key.to_string(),
                    }
                } else {
                    self.transport("GetObject", DisplayErrorContext(&err))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|err| self.transport("GetObject body", err))?;
        Ok(data.into_bytes())
    }

    #[tracing::instrument(name = "storage.delete_object", skip(self), fields(s3.bucket = %self.bucket, s3.key = %key), err)]
    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.transport("DeleteObject", DisplayErrorContext(&err)))?;
        Ok(())
    }

    #[tracing::instrument(name = "storage.create_multipart_upload", skip(self), fields(s3.bucket = %self.bucket, s3.key = %key), err)]
    async fn create_multipart_upload(&self, key: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.transport("CreateMultipartUpload", DisplayErrorContext(&err)))?;

        let upload_id = response.upload_id().ok_or_else(|| BackendError::Rejected {
            vendor: VENDOR,
            message: "CreateMultipartUpload returned no upload id".into(),
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            upload_id = %upload_id,
            "Created multipart upload"
        );

        Ok(upload_id.to_string())
    }

    #[tracing::instrument(
        name = "storage.upload_part",
        skip(self, body),
        fields(
            s3.bucket = %self.bucket,
            s3.upload_id = %upload_id,
            s3.part_number = part_number,
            upload.bytes = body.len()
        ),
        err
    )]
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<CompletedPart, BackendError> {
        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| self.transport("UploadPart", DisplayErrorContext(&err)))?;

        let etag = response.e_tag().ok_or_else(|| BackendError::Rejected {
            vendor: VENDOR,
            message: format!("UploadPart {} returned no etag", part_number),
        })?;

        Ok(CompletedPart {
            part_number,
            etag: etag.to_string(),
        })
    }

    #[tracing::instrument(
        name = "storage.complete_multipart_upload",
        skip(self, parts),
        fields(s3.bucket = %self.bucket, s3.upload_id = %upload_id, parts_count = parts.len()),
        err
    )]
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), BackendError> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|part| {
                        S3CompletedPart::builder()
                            .part_number(part.part_number as i32)
                            .e_tag(&part.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| {
                let message = format!("CompleteMultipartUpload: {}", DisplayErrorContext(&err));
                // Service-level errors here are vendor-side validation
                // failures (e.g. etag mismatch), not transport faults
                if err.as_service_error().is_some() {
                    BackendError::Rejected {
                        vendor: VENDOR,
                        message,
                    }
                } else {
                    BackendError::Transport {
                        vendor: VENDOR,
                        message,
                    }
                }
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            parts = parts.len(),
            "Completed multipart upload"
        );

        Ok(())
    }

    #[tracing::instrument(name = "storage.abort_multipart_upload", skip(self), fields(s3.bucket = %self.bucket, s3.upload_id = %upload_id), err)]
    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), BackendError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| self.transport("AbortMultipartUpload", DisplayErrorContext(&err)))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            upload_id = %upload_id,
            "Aborted multipart upload"
        );

        Ok(())
    }
}
