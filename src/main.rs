use anyhow::Result;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod database;
mod errors;
mod handlers;
mod models;
mod proto;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod testing;

use config::{AppConfig, StorageBackend};
use services::{
    ad_service::{AdManager, CleanupPolicy, ServiceOptions},
    ad_store::SqlAdStore,
    disk_uploader::DiskUploader,
    image_processor::GrpcImageProcessor,
    object_uploader::ObjectUploader,
    photo_store::SqlPhotoStore,
    s3_uploader::{S3Settings, S3Uploader},
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;
    tracing::info!("Starting ad-manager with config: {:?}", cfg);

    // --- Database ---
    let db = database::connect(&cfg.database_url, migrate).await?;
    if migrate {
        database::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }
    database::ensure_schema(&db).await?;

    // --- Collaborators ---
    let uploader = build_uploader(&cfg).await;
    let processor = GrpcImageProcessor::connect_lazy(&cfg.image_processor_url, cfg.processing_timeout)?;
    let options = ServiceOptions {
        upload_timeout: cfg.upload_timeout,
        require_price: cfg.require_price,
        cleanup: if cfg.strict_cleanup {
            CleanupPolicy::Strict
        } else {
            CleanupPolicy::Preserve
        },
    };
    let service = AdManager::new(
        Arc::new(SqlAdStore::new(db.clone())),
        Arc::new(SqlPhotoStore::new(db.clone())),
        uploader,
        Arc::new(processor),
        options,
    );

    // --- Build router ---
    let state = AppState {
        service: Arc::new(service),
        db: db.clone(),
    };
    let app = routes::routes::app(state, &cfg.path_prefix, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Server stopped.");
    Ok(())
}

async fn build_uploader(cfg: &AppConfig) -> Arc<dyn ObjectUploader> {
    match cfg.storage_backend {
        StorageBackend::S3 => {
            let settings = S3Settings {
                bucket: cfg.bucket.clone(),
                region: cfg.s3_region.clone(),
                endpoint_url: cfg.s3_endpoint.clone(),
                force_path_style: cfg.s3_force_path_style,
                public_base_url: cfg.public_base_url.clone(),
            };
            tracing::info!(bucket = %settings.bucket, "storing photos in S3");
            Arc::new(S3Uploader::new(&settings).await)
        }
        StorageBackend::Disk => {
            tracing::info!(dir = %cfg.storage_dir, "storing photos on local disk");
            Arc::new(DiskUploader::new(
                cfg.storage_dir.clone(),
                cfg.bucket.clone(),
                cfg.public_base_url.clone(),
            ))
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections.");
}
