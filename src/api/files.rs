//! File API handlers.
//!
//! Thin HTTP layer over [`FileService`]: multipart decoding, id parsing and
//! the per-request deadline live here, everything else in the service.

use std::future::Future;
use std::io;
use std::time::Duration;

use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, future, stream};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::Config;
use crate::error::{AppError, AppResult, ErrorResponse};
use crate::models::FileRecord;
use crate::services::{BodyStream, FileService, FileUpload};

/// Multipart part that carries the file content.
const FILE_FIELD: &str = "file";

/// Chunks buffered between the request body and the object store.
const UPLOAD_CHANNEL_DEPTH: usize = 4;

/// Limits applied by the file handlers.
#[derive(Debug, Clone)]
pub struct FileApiSettings {
    /// Largest accepted file, in bytes.
    pub max_upload_size: usize,
    /// Deadline for one service call.
    pub request_timeout: Duration,
}

impl FileApiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_size: config.max_upload_size,
            request_timeout: config.request_timeout(),
        }
    }
}

/// Multipart upload form.
#[derive(ToSchema)]
pub struct UploadForm {
    /// File content. The part's filename and content type are recorded.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Run `fut` under the request deadline.
async fn with_deadline<T, F>(settings: &FileApiSettings, operation: &str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(settings.request_timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::DeadlineExceeded(format!(
            "{} did not complete within {}s",
            operation,
            settings.request_timeout.as_secs()
        ))),
    }
}

fn parse_file_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| AppError::InvalidInput(format!("invalid file id: {}", raw)))
}

/// Advance to the `file` part, discarding any other parts before it.
async fn next_file_field(payload: &mut Multipart) -> AppResult<Field> {
    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        if field.name() == Some(FILE_FIELD) {
            return Ok(field);
        }

        while let Some(chunk) = field.next().await {
            chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
        }
    }

    Err(AppError::InvalidInput(format!(
        "field '{}' is required",
        FILE_FIELD
    )))
}

fn field_filename(field: &Field) -> AppResult<String> {
    field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidInput("Missing filename in multipart".to_string()))
}

fn field_content_type(field: &Field) -> Option<String> {
    field.content_type().map(|mime| mime.to_string())
}

fn too_large(max_size: usize) -> AppError {
    AppError::InvalidInput(format!(
        "File exceeds maximum upload size of {} bytes",
        max_size
    ))
}

/// Forward a multipart field into `tx` chunk by chunk.
///
/// Read errors and the size limit are reported twice: into the channel so the
/// store aborts its write, and as the return value for the response.
async fn pump_field(
    mut field: Field,
    tx: mpsc::Sender<io::Result<Bytes>>,
    max_size: usize,
) -> AppResult<()> {
    let mut received = 0usize;

    while let Some(chunk) = field.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                return Err(AppError::InvalidInput(format!("Read error: {}", e)));
            }
        };

        received += chunk.len();
        if received > max_size {
            let _ = tx
                .send(Err(io::Error::other("upload exceeds maximum size")))
                .await;
            return Err(too_large(max_size));
        }

        if tx.send(Ok(chunk)).await.is_err() {
            // Store stopped reading; its own error is reported instead.
            break;
        }
    }

    Ok(())
}

fn channel_body(rx: mpsc::Receiver<io::Result<Bytes>>) -> BodyStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

/// Read a whole multipart field into memory.
async fn read_field(mut field: Field, max_size: usize) -> AppResult<Bytes> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
        if data.len() + chunk.len() > max_size {
            return Err(too_large(max_size));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

/// List all files.
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "Files",
    responses(
        (status = 200, description = "All files, most recent first", body = Vec<FileRecord>),
        (status = 500, description = "Metadata store failure", body = ErrorResponse),
    )
)]
pub async fn list_files(
    service: web::Data<FileService>,
    settings: web::Data<FileApiSettings>,
) -> AppResult<HttpResponse> {
    let files = with_deadline(&settings, "list files", service.list_files()).await?;
    Ok(HttpResponse::Ok().json(files))
}

/// Upload a file.
///
/// The content is streamed to object storage as it arrives; the metadata row
/// is written once the object is stored.
#[utoipa::path(
    post,
    path = "/api/files",
    tag = "Files",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = FileRecord),
        (status = 400, description = "Missing or oversized file part", body = ErrorResponse),
        (status = 500, description = "Storage or metadata failure", body = ErrorResponse),
    )
)]
pub async fn upload_file(
    service: web::Data<FileService>,
    settings: web::Data<FileApiSettings>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let field = next_file_field(&mut payload).await?;
    let filename = field_filename(&field)?;
    let content_type = field_content_type(&field);

    debug!(filename = %filename, "Receiving upload");

    let (tx, rx) = mpsc::channel(UPLOAD_CHANNEL_DEPTH);
    let upload = FileUpload {
        filename,
        content: channel_body(rx),
        declared_size: None,
        content_type,
    };

    let (pumped, stored) = with_deadline(&settings, "upload", async {
        Ok(future::join(
            pump_field(field, tx, settings.max_upload_size),
            service.upload_file(upload),
        )
        .await)
    })
    .await?;

    match (pumped, stored) {
        (Ok(()), Ok(record)) => Ok(HttpResponse::Created().json(record)),
        (Ok(()), Err(e)) => Err(e),
        (Err(e), Ok(record)) => {
            // Store finished before the body error reached it.
            if let Err(cleanup) = service.delete_file(record.id).await {
                warn!(file_id = record.id, "Failed to remove partial upload: {}", cleanup);
            }
            Err(e)
        }
        (Err(e), Err(_)) => Err(e),
    }
}

/// Upload a file and summarize it in one step.
///
/// Nothing is kept if summarization fails.
#[utoipa::path(
    post,
    path = "/api/files/analyze",
    tag = "Files",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored with summary", body = FileRecord),
        (status = 400, description = "Missing or oversized file part", body = ErrorResponse),
        (status = 500, description = "Storage, summary or metadata failure", body = ErrorResponse),
    )
)]
pub async fn upload_and_analyze(
    service: web::Data<FileService>,
    settings: web::Data<FileApiSettings>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let record = with_deadline(&settings, "upload and analyze", async {
        let field = next_file_field(&mut payload).await?;
        let filename = field_filename(&field)?;
        let content_type = field_content_type(&field);
        let content = read_field(field, settings.max_upload_size).await?;

        service
            .upload_and_analyze(filename, content, content_type)
            .await
    })
    .await?;

    Ok(HttpResponse::Created().json(record))
}

/// Summarize a stored file.
#[utoipa::path(
    post,
    path = "/api/files/{id}/analyze",
    tag = "Files",
    params(
        ("id" = i64, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "Summary saved", body = FileRecord),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Storage, summary or metadata failure", body = ErrorResponse),
    )
)]
pub async fn analyze_file(
    service: web::Data<FileService>,
    settings: web::Data<FileApiSettings>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_file_id(&path)?;
    let record = with_deadline(&settings, "analyze", service.analyze_file(id)).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Delete a file and its content.
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "Files",
    params(
        ("id" = i64, Path, description = "File id")
    ),
    responses(
        (status = 204, description = "File deleted"),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Storage or metadata failure", body = ErrorResponse),
    )
)]
pub async fn delete_file(
    service: web::Data<FileService>,
    settings: web::Data<FileApiSettings>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_file_id(&path)?;
    with_deadline(&settings, "delete", service.delete_file(id)).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure file routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/files")
            .route(web::get().to(list_files))
            .route(web::post().to(upload_file)),
    )
    // Registered before /files/{id} so "analyze" is not taken as an id.
    .service(web::resource("/files/analyze").route(web::post().to(upload_and_analyze)))
    .service(web::resource("/files/{id}/analyze").route(web::post().to(analyze_file)))
    .service(web::resource("/files/{id}").route(web::delete().to(delete_file)));
}
