//! HTTP middleware.

pub mod request_logger;

pub use request_logger::{REQUEST_ID_HEADER, RequestLogger};
