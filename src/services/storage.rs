//! Object storage for uploaded file content.
//!
//! [`ObjectStore`] is the capability the file service depends on; [`S3Storage`]
//! implements it for AWS S3 and S3-compatible services such as MinIO.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::S3Config;
use crate::error::{AppError, AppResult};

/// Lazily-read object content.
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Size of each part of an S3 multipart upload (S3 minimum is 5MB).
pub const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

/// Region S3 treats as the default location (no location constraint allowed).
const DEFAULT_REGION: &str = "us-east-1";

/// Uniform interface over a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> AppResult<()>;

    /// Stream `body` into the bucket under `key`.
    ///
    /// `length` is a size hint; the stream is authoritative.
    async fn upload(
        &self,
        key: &str,
        body: BodyStream,
        length: Option<u64>,
        content_type: &str,
    ) -> AppResult<()>;

    /// Open the object for reading.
    async fn download(&self, key: &str) -> AppResult<BodyStream>;

    /// Remove the object. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Wrap an in-memory buffer as a single-chunk body.
pub fn body_from_bytes(data: impl Into<Bytes>) -> BodyStream {
    let data: Bytes = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a body into memory.
pub async fn read_body(mut body: BodyStream) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

/// Read from `body` until at least `part_size` bytes are buffered or the
/// stream ends. Returns the buffer and whether the stream is exhausted.
async fn fill_part(body: &mut BodyStream, part_size: usize) -> std::io::Result<(Bytes, bool)> {
    let mut buf = BytesMut::new();
    while buf.len() < part_size {
        match body.next().await {
            Some(chunk) => buf.extend_from_slice(&chunk?),
            None => return Ok((buf.freeze(), true)),
        }
    }
    Ok((buf.freeze(), false))
}

/// True when the request never reached S3 (connection refused, DNS, timeout).
fn is_unreachable<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_))
}

/// Open S3 multipart upload that is aborted unless disarmed.
///
/// Dropping an armed guard spawns the abort on the current Tokio runtime, so
/// a cancelled request does not leave uploaded parts behind in the bucket.
struct MultipartGuard {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    armed: bool,
}

impl MultipartGuard {
    fn new(client: &Client, bucket: &str, key: &str, upload_id: &str) -> Self {
        Self {
            client: client.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            armed: true,
        }
    }

    /// The upload completed; nothing to clean up.
    fn disarm(&mut self) {
        self.armed = false;
    }

    /// Abort inline, logging failures.
    async fn abort(&mut self) {
        self.armed = false;
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
        {
            warn!(object_key = %self.key, "Failed to abort multipart upload: {}", e);
        }
    }

    /// Spawn the abort without waiting for it. Returns whether a task was spawned.
    fn abort_in_background(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                object_key = %self.key,
                upload_id = %self.upload_id,
                "No runtime to abort multipart upload; parts left in bucket"
            );
            return false;
        };

        let request = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id);
        let key = self.key.clone();

        runtime.spawn(async move {
            match request.send().await {
                Ok(_) => debug!(object_key = %key, "Aborted cancelled multipart upload"),
                Err(e) => warn!(object_key = %key, "Failed to abort multipart upload: {}", e),
            }
        });
        true
    }
}

impl Drop for MultipartGuard {
    fn drop(&mut self) {
        self.abort_in_background();
    }
}

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Storage {
    /// Create a new S3 storage client from configuration.
    ///
    /// Does not touch the network; call [`ObjectStore::ensure_bucket`] at startup.
    pub fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            config.secret_key.expose_secret(),
            None,
            None,
            "file-service",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }

    /// The configured bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_bucket(&self, bucket: &str) -> AppResult<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!("S3 bucket '{}' created", bucket);
                Ok(())
            }
            Err(e) if is_unreachable(&e) => Err(AppError::StoreUnavailable(format!(
                "Failed to reach S3 while creating bucket '{}': {}",
                bucket, e
            ))),
            Err(e) => {
                let service_error = e.into_service_error();
                // Lost a creation race against another instance.
                if service_error.is_bucket_already_owned_by_you() {
                    return Ok(());
                }
                Err(AppError::StoreProvisionFailed(format!(
                    "Failed to create bucket '{}': {}",
                    bucket, service_error
                )))
            }
        }
    }

    async fn put_single(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
        let length = data.len() as i64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(length)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                AppError::StoreWriteFailed(format!("Failed to upload {} to S3: {}", key, e))
            })?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        first_part: Bytes,
        body: BodyStream,
        content_type: &str,
    ) -> AppResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                AppError::StoreWriteFailed(format!("Failed to start multipart upload: {}", e))
            })?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                AppError::StoreWriteFailed("S3 returned no multipart upload id".to_string())
            })?
            .to_string();

        // Aborts the upload if this future is dropped before completion.
        let mut guard = MultipartGuard::new(&self.client, &self.bucket, key, &upload_id);

        let parts = match self.upload_parts(key, &upload_id, first_part, body).await {
            Ok(parts) => parts,
            Err(e) => {
                guard.abort().await;
                return Err(e);
            }
        };

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                AppError::StoreWriteFailed(format!("Failed to complete multipart upload: {}", e))
            })?;

        guard.disarm();
        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first_part: Bytes,
        mut body: BodyStream,
    ) -> AppResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part_number = 1;
        let mut data = first_part;
        let mut exhausted = false;

        loop {
            if !data.is_empty() {
                let response = self
                    .client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::StoreWriteFailed(format!(
                            "Failed to upload part {} of {}: {}",
                            part_number, key, e
                        ))
                    })?;

                parts.push(
                    CompletedPart::builder()
                        .set_e_tag(response.e_tag().map(String::from))
                        .part_number(part_number)
                        .build(),
                );
                debug!(object_key = %key, part_number, "Uploaded part");
                part_number += 1;
            }

            if exhausted {
                return Ok(parts);
            }

            let (next, done) = fill_part(&mut body, MULTIPART_PART_SIZE)
                .await
                .map_err(|e| {
                    AppError::StoreWriteFailed(format!("Failed to read upload body: {}", e))
                })?;
            data = next;
            exhausted = done;
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn ensure_bucket(&self, bucket: &str) -> AppResult<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("S3 bucket '{}' exists", bucket);
                Ok(())
            }
            Err(e) if is_unreachable(&e) => Err(AppError::StoreUnavailable(format!(
                "Failed to reach S3: {}",
                e
            ))),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    info!("Creating S3 bucket '{}'", bucket);
                    self.create_bucket(bucket).await
                } else {
                    Err(AppError::StoreUnavailable(format!(
                        "Failed to access bucket '{}': {}",
                        bucket, service_error
                    )))
                }
            }
        }
    }

    async fn upload(
        &self,
        key: &str,
        mut body: BodyStream,
        length: Option<u64>,
        content_type: &str,
    ) -> AppResult<()> {
        debug!(object_key = %key, ?length, "Uploading object");

        let (first, exhausted) = fill_part(&mut body, MULTIPART_PART_SIZE)
            .await
            .map_err(|e| AppError::StoreWriteFailed(format!("Failed to read upload body: {}", e)))?;

        if exhausted {
            self.put_single(key, first, content_type).await
        } else {
            self.put_multipart(key, first, body, content_type).await
        }
    }

    async fn download(&self, key: &str) -> AppResult<BodyStream> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_unreachable(&e) {
                    return AppError::StoreUnavailable(format!("Failed to reach S3: {}", e));
                }
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    AppError::StoreObjectNotFound(key.to_string())
                } else {
                    AppError::StoreUnavailable(format!(
                        "Failed to get {} from S3: {}",
                        key, service_error
                    ))
                }
            })?;

        let chunks = stream::unfold(response.body, |mut body| async move {
            body.next()
                .await
                .map(|chunk| (chunk.map_err(std::io::Error::other), body))
        });

        Ok(Box::pin(chunks))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::StoreWriteFailed(format!("Failed to delete {} from S3: {}", key, e))
            })?;

        Ok(())
    }
}
