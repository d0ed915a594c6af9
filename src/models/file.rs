//! File metadata models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::file;

/// Content type recorded when the uploader does not supply one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Metadata of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    pub id: i64,
    /// Filename as supplied by the uploader.
    pub name: String,
    /// Content length in bytes at upload time.
    pub size: i64,
    pub mime_type: String,
    /// Location of the bytes in the bucket.
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// AI-generated summary, present once the file has been analyzed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,
}

impl From<file::Model> for FileRecord {
    fn from(m: file::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            size: m.size,
            mime_type: m.mime_type,
            object_key: m.object_key,
            created_at: m.created_at,
            updated_at: m.updated_at,
            resume: m.resume,
        }
    }
}

/// Fields supplied when inserting a file row.
///
/// `id`, `created_at` and `updated_at` are assigned by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub object_key: String,
    pub resume: Option<String>,
}
