//! Reminder ticks against an in-process Storage server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use message_queue::{MemoryPublisher, TemplateKind};
use notification_service::config::ReminderSettings;
use notification_service::error::ReminderError;
use notification_service::reminder::{reminder_subject, ServerIdentity};
use notification_service::storage::GrpcReminderStore;
use notification_service::ReminderScheduler;
use storage_service::config::RetentionSettings;
use storage_service::db::InMemoryMessageRepository;
use storage_service::grpc::{correlation_interceptor, DbServiceImpl};
use storage_service::pb::db_service_server::DbServiceServer;
use storage_service::StorageService;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Endpoint, Server};

async fn start_storage(repo: Arc<InMemoryMessageRepository>) -> GrpcReminderStore {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let service = StorageService::new(repo, RetentionSettings::default());

    tokio::spawn(async move {
        Server::builder()
            .add_service(DbServiceServer::with_interceptor(
                DbServiceImpl::new(service),
                correlation_interceptor,
            ))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    let channel = Endpoint::from_shared(format!("http://{}", addr))
        .unwrap()
        .connect_timeout(Duration::from_secs(5))
        .connect()
        .await
        .unwrap();
    GrpcReminderStore::new(channel)
}

fn scheduler(store: GrpcReminderStore, publisher: Arc<MemoryPublisher>) -> ReminderScheduler {
    ReminderScheduler::new(
        Arc::new(store),
        publisher,
        ReminderSettings {
            enabled: true,
            check_after_hours: 24,
            max_reminders: 3,
            reminder_interval_hours: 24,
        },
        ServerIdentity {
            email: "server@password.exchange".into(),
            name: "Password Exchange".into(),
        },
    )
}

#[tokio::test]
async fn test_day_old_unviewed_message_gets_one_reminder() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let id = repo.seed_message("day-old", "a@b.c", Utc::now() - ChronoDuration::hours(48), 0, 1);
    let publisher = Arc::new(MemoryPublisher::new());

    let store = start_storage(repo.clone()).await;
    let summary = scheduler(store, publisher.clone())
        .run_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.sent, 1);
    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].recipient_email, "a@b.c");
    assert_eq!(published[0].subject, reminder_subject(1));
    assert_eq!(published[0].template_kind(), TemplateKind::Reminder);
    assert!(published[0].url.is_empty());

    let log = repo.reminders();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message_id, id);
    assert_eq!(log[0].reminder_count, 1);
}

#[tokio::test]
async fn test_recent_reminder_suppresses_resend() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let now = Utc::now();
    let id = repo.seed_message("recent", "a@b.c", now - ChronoDuration::hours(48), 0, 1);
    let sent_at = now - ChronoDuration::hours(1);
    repo.seed_reminder(id, "a@b.c", 1, sent_at);
    let publisher = Arc::new(MemoryPublisher::new());

    let store = start_storage(repo.clone()).await;
    let summary = scheduler(store, publisher.clone())
        .run_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.candidates, 0);
    assert_eq!(publisher.count(), 0);
    let log = repo.reminders();
    assert_eq!(log[0].reminder_count, 1);
    assert_eq!(log[0].last_reminder_sent, sent_at);
}

#[tokio::test]
async fn test_reminder_cap_stops_sending() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let now = Utc::now();
    let id = repo.seed_message("capped", "a@b.c", now - ChronoDuration::hours(100), 0, 1);
    repo.seed_reminder(id, "a@b.c", 3, now - ChronoDuration::hours(72));
    let publisher = Arc::new(MemoryPublisher::new());

    let store = start_storage(repo.clone()).await;
    let summary = scheduler(store, publisher.clone())
        .run_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.candidates, 0);
    assert_eq!(publisher.count(), 0);
    assert_eq!(repo.reminders()[0].reminder_count, 3);
}

#[tokio::test]
async fn test_second_reminder_is_numbered_from_history() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let now = Utc::now();
    let id = repo.seed_message("second", "a@b.c", now - ChronoDuration::hours(96), 0, 1);
    repo.seed_reminder(id, "a@b.c", 1, now - ChronoDuration::hours(30));
    let publisher = Arc::new(MemoryPublisher::new());

    let store = start_storage(repo.clone()).await;
    scheduler(store, publisher.clone())
        .run_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(publisher.published()[0].subject, reminder_subject(2));
    let log = repo.reminders();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].reminder_count, 2);
    assert!(log[0].last_reminder_sent > now - ChronoDuration::minutes(1));
}

#[tokio::test]
async fn test_failed_publish_leaves_log_untouched() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    repo.seed_message("unqueued", "a@b.c", Utc::now() - ChronoDuration::hours(48), 0, 1);
    let publisher = Arc::new(MemoryPublisher::new());
    publisher.set_failing(true);

    let store = start_storage(repo.clone()).await;
    let result = scheduler(store, publisher)
        .run_once(&CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ReminderError::AllFailed { failed: 1 })));
    assert!(repo.reminders().is_empty());
}

#[tokio::test]
async fn test_viewed_and_emailless_messages_are_skipped() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let old = Utc::now() - ChronoDuration::hours(48);
    repo.seed_message("viewed", "a@b.c", old, 1, 2);
    repo.seed_message("no-email", "", old, 0, 1);
    let publisher = Arc::new(MemoryPublisher::new());

    let store = start_storage(repo).await;
    let summary = scheduler(store, publisher.clone())
        .run_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.candidates, 0);
    assert_eq!(publisher.count(), 0);
}
