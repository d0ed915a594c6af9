//! File service library.
//!
//! Uploads files to S3-compatible object storage, keeps their metadata in
//! PostgreSQL, and attaches AI-generated summaries on request.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
