/// Frontend Service Main Entry Point
///
/// Serves the browser pages and the `/api/v1` JSON API, calling Storage and
/// Encryption over gRPC and queueing notifications on AMQP.
use std::sync::Arc;

use actix_middleware::{
    CorrelationIdMiddleware, CorsMiddleware, Logging, MetricsMiddleware, RequestTimeoutMiddleware,
};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use frontend_service::{
    clients::{connect_channel, GrpcEncryptionClient, GrpcStorageClient},
    config::Settings,
    health::{GrpcHealthProbe, HealthChecker},
    turnstile::TurnstileVerifier,
    web::templates::Pages,
    AppState, MessageService, RateLimits,
};
use message_queue::AmqpPublisher;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting Frontend Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!(
        environment = ?settings.environment,
        base_url = %settings.server.base_url,
        storage = %settings.services.storage_url,
        encryption = %settings.services.encryption_url,
        "Configuration loaded successfully"
    );

    let services = &settings.services;
    let storage_channel = connect_channel(
        &services.storage_url,
        services.connect_timeout,
        services.request_timeout,
    )
    .context("Invalid storage service endpoint")?;
    let encryption_channel = connect_channel(
        &services.encryption_url,
        services.connect_timeout,
        services.request_timeout,
    )
    .context("Invalid encryption service endpoint")?;

    let storage = GrpcStorageClient::new(storage_channel);
    let encryption = GrpcEncryptionClient::new(encryption_channel);
    let health = HealthChecker::new(
        Box::new(GrpcHealthProbe::new("storage", storage.channel())),
        Box::new(GrpcHealthProbe::new("encryption", encryption.channel())),
        true,
    );

    let publisher = Arc::new(AmqpPublisher::new(settings.amqp.clone()));

    let mut messages = MessageService::new(
        Arc::new(storage),
        Arc::new(encryption),
        settings.server.base_url.clone(),
        settings.messages.clone(),
    )
    .with_publisher(publisher.clone());

    if let Some(secret) = &settings.turnstile.secret {
        let verifier = TurnstileVerifier::new(secret.clone())
            .context("Failed to build Turnstile client")?;
        messages = messages.with_verifier(Arc::new(verifier));
        info!("Turnstile verification enabled");
    }

    let state = web::Data::new(AppState {
        messages,
        health,
        pages: Pages::new().context("Failed to compile page templates")?,
        site_key: settings.turnstile.site_key.clone(),
        default_max_view_count: settings.messages.default_max_view_count,
    });

    let limits = RateLimits::new(&settings.server.trusted_proxies);
    let request_timeout = settings.server.request_timeout;
    let bind_addr = (settings.server.host.clone(), settings.server.http_port);
    info!("Starting HTTP server on {}:{}", bind_addr.0, bind_addr.1);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(RequestTimeoutMiddleware::new(request_timeout))
            .wrap(Logging)
            .wrap(MetricsMiddleware)
            .wrap(CorsMiddleware)
            .wrap(CorrelationIdMiddleware)
            .configure(|cfg| frontend_service::configure(cfg, &limits))
    })
    .bind(bind_addr)
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .run();

    let shutdown = CancellationToken::new();
    let handle = server.handle();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            handle.stop(true).await;
        }
    });

    server.await.context("HTTP server error")?;

    shutdown.cancel();
    publisher.close().await;

    info!("Frontend service shutdown complete");
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
