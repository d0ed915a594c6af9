//! File lifecycle service.
//!
//! Keeps object storage and file metadata consistent across the multi-step
//! operations. The two stores share no transaction, so each operation is a
//! short saga with a fixed order:
//!
//! - upload: write object, then insert row (row failure deletes the object)
//! - delete: delete object, then delete row (row failure leaves the row behind)
//! - analyze: read object, summarize, then update row (nothing to undo)
//!
//! Nothing is recorded about in-flight operations, so a crash between steps
//! can leave an orphaned object or a row without an object.
//!
//! Every adapter call is awaited inline. Dropping a returned future (request
//! deadline, client disconnect) cancels whichever call is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::FileRepository;
use crate::error::{AppError, AppResult};
use crate::models::{DEFAULT_MIME_TYPE, FileRecord, NewFile};
use crate::services::storage::{BodyStream, ObjectStore, body_from_bytes, read_body};
use crate::services::summarizer::Summarizer;

/// Content beyond this many characters is not sent to the summary provider.
pub const MAX_ANALYSIS_CHARS: usize = 100_000;

/// A file to be stored.
pub struct FileUpload {
    /// Original filename as supplied by the uploader.
    pub filename: String,
    /// File content, read once.
    pub content: BodyStream,
    /// Size announced by the caller, if known.
    pub declared_size: Option<u64>,
    /// MIME type; `application/octet-stream` when absent.
    pub content_type: Option<String>,
}

/// Coordinates the object store, the metadata repository and the summary provider.
#[derive(Clone)]
pub struct FileService {
    storage: Arc<dyn ObjectStore>,
    repo: Arc<dyn FileRepository>,
    summarizer: Arc<dyn Summarizer>,
}

impl FileService {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        repo: Arc<dyn FileRepository>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            storage,
            repo,
            summarizer,
        }
    }

    /// All files, most recent first.
    pub async fn list_files(&self) -> AppResult<Vec<FileRecord>> {
        self.repo.list().await
    }

    /// Store the content, then record its metadata.
    pub async fn upload_file(&self, upload: FileUpload) -> AppResult<FileRecord> {
        let object_key = generate_object_key(&upload.filename, Utc::now());
        let content_type = resolve_content_type(upload.content_type);

        let streamed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&streamed);
        let body: BodyStream = Box::pin(upload.content.inspect_ok(move |chunk| {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }));

        self.storage
            .upload(&object_key, body, upload.declared_size, &content_type)
            .await?;

        let size = streamed.load(Ordering::Relaxed);
        if let Some(declared) = upload.declared_size
            && declared != size
        {
            warn!(
                object_key = %object_key,
                declared,
                streamed = size,
                "Declared size differs from streamed size; recording streamed size"
            );
        }

        let record = self
            .insert_or_discard(StoredObject {
                name: upload.filename,
                size,
                mime_type: content_type,
                object_key,
                resume: None,
            })
            .await?;

        info!(
            file_id = record.id,
            object_key = %record.object_key,
            size = record.size,
            "File uploaded"
        );

        Ok(record)
    }

    /// Store the content, summarize it, then record metadata and summary together.
    ///
    /// The object is removed again if summarization or the insert fails.
    pub async fn upload_and_analyze(
        &self,
        filename: String,
        content: Bytes,
        content_type: Option<String>,
    ) -> AppResult<FileRecord> {
        let object_key = generate_object_key(&filename, Utc::now());
        let content_type = resolve_content_type(content_type);
        let size = content.len() as u64;

        self.storage
            .upload(
                &object_key,
                body_from_bytes(content.clone()),
                Some(size),
                &content_type,
            )
            .await?;

        let text = String::from_utf8_lossy(&content);
        let resume = match self
            .summarizer
            .summarize(truncate_chars(&text, MAX_ANALYSIS_CHARS))
            .await
        {
            Ok(resume) => resume,
            Err(e) => {
                self.discard_object(&object_key).await;
                return Err(e);
            }
        };

        let record = self
            .insert_or_discard(StoredObject {
                name: filename,
                size,
                mime_type: content_type,
                object_key,
                resume: Some(resume),
            })
            .await?;

        info!(
            file_id = record.id,
            object_key = %record.object_key,
            size = record.size,
            "File uploaded and analyzed"
        );

        Ok(record)
    }

    /// Remove the object, then the metadata row.
    ///
    /// If the row delete fails the object stays deleted; the row is left for
    /// the caller to retry.
    pub async fn delete_file(&self, id: i64) -> AppResult<()> {
        let file = self.repo.get_by_id(id).await?;

        self.storage.delete(&file.object_key).await?;

        if let Err(e) = self.repo.delete(id).await {
            warn!(
                file_id = id,
                object_key = %file.object_key,
                "Object deleted but metadata row removal failed: {}", e
            );
            return Err(e);
        }

        info!(file_id = id, object_key = %file.object_key, "File deleted");
        Ok(())
    }

    /// Summarize a stored file and save the summary on its record.
    pub async fn analyze_file(&self, id: i64) -> AppResult<FileRecord> {
        let file = self.repo.get_by_id(id).await?;

        let body = self.storage.download(&file.object_key).await?;
        let content = read_body(body).await.map_err(|e| {
            AppError::StoreUnavailable(format!(
                "Failed to read {} from storage: {}",
                file.object_key, e
            ))
        })?;

        let text = String::from_utf8_lossy(&content);
        let resume = self
            .summarizer
            .summarize(truncate_chars(&text, MAX_ANALYSIS_CHARS))
            .await?;

        let updated = self.repo.update_resume(id, &resume).await?;

        info!(file_id = id, "File analyzed");
        Ok(updated)
    }

    /// Insert the row for an object already in the store; on any failure
    /// delete the object.
    async fn insert_or_discard(&self, stored: StoredObject) -> AppResult<FileRecord> {
        let object_key = stored.object_key.clone();
        let result = match stored.into_new_file() {
            Ok(new_file) => self.repo.create(new_file).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(record) => Ok(record),
            Err(e) => {
                self.discard_object(&object_key).await;
                Err(match e {
                    AppError::PersistenceWriteFailed(_) | AppError::InvalidInput(_) => e,
                    other => AppError::PersistenceWriteFailed(other.to_string()),
                })
            }
        }
    }

    /// Best-effort removal of an object whose saga failed. Errors are logged only.
    async fn discard_object(&self, object_key: &str) {
        if let Err(e) = self.storage.delete(object_key).await {
            warn!(
                object_key = %object_key,
                "Failed to remove object after aborted upload: {}", e
            );
        }
    }
}

/// An object that has been written and still needs its metadata row.
struct StoredObject {
    name: String,
    size: u64,
    mime_type: String,
    object_key: String,
    resume: Option<String>,
}

impl StoredObject {
    fn into_new_file(self) -> AppResult<NewFile> {
        Ok(NewFile {
            name: self.name,
            size: byte_count(self.size)?,
            mime_type: self.mime_type,
            object_key: self.object_key,
            resume: self.resume,
        })
    }
}

/// Build `{YYYY/MM/DD}/{uuid}_{filename}`.
///
/// The random token makes keys unique even for identical filenames uploaded
/// at the same instant; the date prefix only groups objects.
pub fn generate_object_key(filename: &str, now: DateTime<Utc>) -> String {
    format!("{}/{}_{}", now.format("%Y/%m/%d"), Uuid::new_v4(), filename)
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn resolve_content_type(content_type: Option<String>) -> String {
    content_type
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

fn byte_count(size: u64) -> AppResult<i64> {
    i64::try_from(size)
        .map_err(|_| AppError::InvalidInput(format!("File size {} is out of range", size)))
}
