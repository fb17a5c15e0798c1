/// Encryption Service Main Entry Point
use anyhow::{Context, Result};
use encryption_service::{
    config::Settings,
    grpc::{correlation_interceptor, EncryptionServiceImpl},
    pb::{encryption_service_server::EncryptionServiceServer, FILE_DESCRIPTOR_SET},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting Encryption Service");

    let settings = Settings::load().context("Failed to load configuration")?;

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<EncryptionServiceServer<EncryptionServiceImpl>>()
        .await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .context("Failed to build reflection service")?;

    let addr = format!("{}:{}", settings.host, settings.grpc_port)
        .parse()
        .context("Invalid server address")?;
    info!("Starting gRPC server on {}", addr);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    Server::builder()
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(EncryptionServiceServer::with_interceptor(
            EncryptionServiceImpl::new(),
            correlation_interceptor,
        ))
        .serve_with_shutdown(addr, async move { shutdown.cancelled().await })
        .await
        .context("gRPC server error")?;

    info!("Encryption service shutdown complete");
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
