//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "File Service",
        version = "0.1.0",
        description = "Stores uploaded files in S3-compatible object storage, tracks their metadata in PostgreSQL and attaches AI-generated summaries on request"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        api::health::health,
        api::health::ready,
        api::files::list_files,
        api::files::upload_file,
        api::files::upload_and_analyze,
        api::files::analyze_file,
        api::files::delete_file,
    ),
    components(
        schemas(
            error::ErrorResponse,
            api::health::HealthResponse,
            api::health::ReadyResponse,
            api::files::UploadForm,
            models::FileRecord,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Files", description = "Upload, list, analyze and delete files")
    )
)]
pub struct ApiDoc;
