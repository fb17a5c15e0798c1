/// Notification Service Main Entry Point
///
/// `consume` (the default) delivers queued notifications over SMTP;
/// `reminder` runs a single reminder tick and exits, for a cron-style
/// scheduler to invoke.
use std::sync::Arc;

use actix_middleware::with_correlation_id;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use message_queue::AmqpPublisher;
use notification_service::{
    config::{ReminderSettings, Settings},
    mailer::SmtpMailer,
    reminder::ServerIdentity,
    server,
    storage::GrpcReminderStore,
    templates::EmailTemplates,
    DeliveryProcessor, QueueConsumer, ReminderScheduler,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notification-service")]
#[command(about = "Password Exchange email delivery and reminders")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Consume the notification queue and deliver email
    Consume,
    /// Run one reminder tick
    Reminder {
        /// List candidates without queueing or recording anything
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        older_than_hours: Option<i32>,
        #[arg(long)]
        max_reminders: Option<i32>,
        #[arg(long)]
        interval_hours: Option<i32>,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let settings = Settings::load().context("Failed to load configuration")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match cli.command.unwrap_or(Command::Consume) {
        Command::Consume => consume(settings, shutdown).await,
        Command::Reminder {
            dry_run,
            older_than_hours,
            max_reminders,
            interval_hours,
        } => {
            let overrides = ReminderSettings {
                check_after_hours: older_than_hours.unwrap_or(settings.reminder.check_after_hours),
                max_reminders: max_reminders.unwrap_or(settings.reminder.max_reminders),
                reminder_interval_hours: interval_hours
                    .unwrap_or(settings.reminder.reminder_interval_hours),
                ..settings.reminder
            };
            overrides.validate().context("Invalid reminder options")?;
            remind(settings, overrides, dry_run, shutdown).await
        }
    }
}

async fn consume(settings: Settings, shutdown: CancellationToken) -> Result<()> {
    info!(
        queue = %settings.amqp.queue_name,
        workers = settings.consumer.workers,
        smtp_host = %settings.smtp.host,
        "Starting Notification Service"
    );

    let templates =
        EmailTemplates::load(&settings.templates).context("Failed to load email templates")?;
    let mailer = SmtpMailer::new(&settings.smtp).context("Failed to configure SMTP")?;
    let processor = Arc::new(DeliveryProcessor::new(
        templates,
        Arc::new(mailer),
        settings.site_url.clone(),
    ));

    let consumer = QueueConsumer::new(
        settings.amqp.clone(),
        settings.consumer.workers,
        settings.consumer.reconnect_attempts,
    );

    info!(
        "Starting health server on {}:{}",
        settings.http.host, settings.http.port
    );
    let http = server::build(consumer.status(), &settings.http.host, settings.http.port)
        .context("Failed to bind health server")?;
    let http_handle = http.handle();
    let http_task = tokio::spawn(http);

    let result = consumer.run(processor, shutdown.clone()).await;

    shutdown.cancel();
    http_handle.stop(true).await;
    if let Err(e) = http_task.await {
        error!(error = %e, "Health server task failed");
    }

    result.context("Notification consumer stopped")?;
    info!("Notification service shutdown complete");
    Ok(())
}

async fn remind(
    settings: Settings,
    reminder: ReminderSettings,
    dry_run: bool,
    shutdown: CancellationToken,
) -> Result<()> {
    let store = GrpcReminderStore::connect_lazy(
        &settings.storage.url,
        settings.storage.connect_timeout,
        settings.storage.request_timeout,
    )
    .context("Invalid storage service endpoint")?;
    let publisher = Arc::new(AmqpPublisher::new(settings.amqp.clone()));

    let scheduler = ReminderScheduler::new(
        Arc::new(store),
        publisher.clone(),
        reminder,
        ServerIdentity {
            email: settings.smtp.from_email.clone(),
            name: settings.smtp.from_name.clone(),
        },
    )
    .dry_run(dry_run);

    let run_id = uuid::Uuid::new_v4().to_string();
    info!(run_id = %run_id, "Running reminder tick");
    let result = with_correlation_id(run_id, scheduler.run_once(&shutdown)).await;
    publisher.close().await;

    let summary = result.context("Reminder run failed")?;
    info!(
        candidates = summary.candidates,
        sent = summary.sent,
        failed = summary.failed,
        "Reminder tick complete"
    );
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
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
