//! Domain models for the file service.

pub mod file;

pub use file::{DEFAULT_MIME_TYPE, FileRecord, NewFile};
