/// Storage Service Main Entry Point
///
/// Starts the gRPC server with:
/// - PostgreSQL connection pool and migrations
/// - Hourly cleanup of consumed and expired messages
/// - gRPC health and reflection
use anyhow::{Context, Result};
use std::sync::Arc;
use storage_service::{
    cleanup::spawn_cleanup_loop,
    config::Settings,
    db::{create_pool, PgMessageRepository},
    grpc::{correlation_interceptor, DbServiceImpl},
    pb::{db_service_server::DbServiceServer, FILE_DESCRIPTOR_SET},
    StorageService,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting Storage Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!(database = ?settings.database, "Configuration loaded successfully");

    let pool = create_pool(&settings.database)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let repo = Arc::new(PgMessageRepository::new(
        pool.clone(),
        settings.retention.default_ttl_hours,
    ));
    let store = StorageService::new(repo, settings.retention.clone());

    let shutdown = CancellationToken::new();
    let cleanup_handle = spawn_cleanup_loop(
        store.clone(),
        settings.retention.cleanup_interval,
        shutdown.child_token(),
    );

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<DbServiceServer<DbServiceImpl>>()
        .await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .context("Failed to build reflection service")?;

    let addr = format!("{}:{}", settings.server.host, settings.server.grpc_port)
        .parse()
        .context("Invalid server address")?;
    info!("Starting gRPC server on {}", addr);

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let server_shutdown = shutdown.clone();
    Server::builder()
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(DbServiceServer::with_interceptor(
            DbServiceImpl::new(store),
            correlation_interceptor,
        ))
        .serve_with_shutdown(addr, async move { server_shutdown.cancelled().await })
        .await
        .context("gRPC server error")?;

    shutdown.cancel();
    let _ = cleanup_handle.await;
    pool.close().await;

    info!("Storage service shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(
                std::env::var("PASSWORDEXCHANGE_LOGLEVEL").unwrap_or_else(|_| "info".into()),
            )
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .json()
        .init();
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }

    info!("Shutting down gracefully...");
    token.cancel();
}
