//! Business logic services.

pub mod files;
pub mod storage;
pub mod summarizer;

pub use files::{FileService, FileUpload, MAX_ANALYSIS_CHARS};
pub use storage::{BodyStream, ObjectStore, S3Storage, body_from_bytes, read_body};
pub use summarizer::{OpenAiSummarizer, Summarizer};
