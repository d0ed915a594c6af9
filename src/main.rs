//! File service - main entry point.
//!
//! Loads configuration, connects the database, object store and summary
//! provider, then starts the Actix-web server.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use file_service_lib::api::{self, ApiDoc, FileApiSettings};
use file_service_lib::config::Config;
use file_service_lib::db::DbPool;
use file_service_lib::middleware::{REQUEST_ID_HEADER, RequestLogger};
use file_service_lib::services::{FileService, ObjectStore, OpenAiSummarizer, S3Storage};

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    match Config::from_env() {
        Ok(config) => match DbPool::new(&config).await {
            Ok(pool) => pool.ping().await.is_ok(),
            Err(_) => false,
        },
        Err(_) => false,
    }
}

/// Log `message` with the error and exit.
fn fail(message: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", message, err);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check().await { 0 } else { 1 });
    }

    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, S3 credentials and OPENAI_API_KEY must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  File Service");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for DATABASE_URL and S3 credentials");
        if config.openai.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; summary requests are sent unauthenticated");
        }
    }

    let pool = DbPool::new(&config)
        .await
        .unwrap_or_else(|e| fail("Failed to connect to database", e));
    info!("Database connection established");

    if let Err(e) = pool.run_migrations().await {
        fail("Failed to run migrations", e);
    }

    let storage = S3Storage::new(&config.s3);
    if let Err(e) = storage.ensure_bucket(storage.bucket()).await {
        fail("Failed to provision storage bucket", e);
    }
    info!(bucket = %storage.bucket(), "Object storage ready");

    let summarizer = OpenAiSummarizer::new(&config.openai)
        .unwrap_or_else(|e| fail("Failed to create summary client", e));
    info!(model = %config.openai.model, "Summary provider configured");

    let service = web::Data::new(FileService::new(
        Arc::new(storage),
        Arc::new(pool.clone()),
        Arc::new(summarizer),
    ));
    let pool_data = web::Data::new(pool);
    let settings = web::Data::new(FileApiSettings::from_config(&config));
    let openapi = ApiDoc::openapi();

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    info!(
        "Limits: {}MB max upload, {}s per request",
        config.max_upload_size / 1024 / 1024,
        config.request_timeout_secs
    );

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };

    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::permissive()
        } else {
            // Same-origin only
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .expose_headers(vec![REQUEST_ID_HEADER])
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(service.clone())
            .app_data(pool_data.clone())
            .app_data(settings.clone())
            // Must precede the /api scope
            .service(
                SwaggerUi::new("/api/docs/{_:.*}").url("/api/openapi.json", openapi.clone()),
            )
            .service(
                web::scope("/api")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_file_routes),
            )
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
