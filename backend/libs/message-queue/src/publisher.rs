use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use email_validation::mask_email_for_logging;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use resilience::{with_timeout_result, TimeoutError};
use tracing::{debug, info, warn};

use crate::config::AmqpSettings;
use crate::envelope::NotificationEnvelope;
use crate::error::QueueError;
use crate::topology::declare_queue;
use crate::ENVELOPE_CONTENT_TYPE;

/// Persistent delivery mode
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Default bound for a single publish, connection setup included
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer side of the notification queue
#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    async fn publish(&self, envelope: &NotificationEnvelope) -> Result<(), QueueError>;
}

struct PublisherChannel {
    connection: Connection,
    channel: Channel,
}

/// Publishes envelopes over AMQP.
///
/// A channel is not safe for concurrent publishes, so the channel lives
/// behind an async mutex and publishes are serialized. The connection is
/// opened lazily and reopened after any failure.
pub struct AmqpPublisher {
    settings: AmqpSettings,
    publish_timeout: Duration,
    state: tokio::sync::Mutex<Option<PublisherChannel>>,
}

impl AmqpPublisher {
    pub fn new(settings: AmqpSettings) -> Self {
        Self {
            settings,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            state: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Open the connection eagerly so startup surfaces broker problems
    pub async fn connect(settings: AmqpSettings) -> Result<Self, QueueError> {
        let publisher = Self::new(settings);
        let opened = open_channel(&publisher.settings).await?;
        *publisher.state.lock().await = Some(opened);
        Ok(publisher)
    }

    pub async fn close(&self) {
        if let Some(state) = self.state.lock().await.take() {
            if let Err(e) = state.channel.close(200, "publisher shutdown").await {
                debug!(error = %e, "Failed to close AMQP channel");
            }
            if let Err(e) = state.connection.close(200, "publisher shutdown").await {
                debug!(error = %e, "Failed to close AMQP connection");
            }
            info!("AMQP notification publisher connection closed");
        }
    }
}

async fn open_channel(settings: &AmqpSettings) -> Result<PublisherChannel, QueueError> {
    let connection = Connection::connect(&settings.uri(), ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;
    declare_queue(&channel, &settings.queue_name).await?;
    info!(
        host = %settings.host,
        queue = %settings.queue_name,
        "Connected AMQP publisher"
    );
    Ok(PublisherChannel {
        connection,
        channel,
    })
}

#[async_trait]
impl EnvelopePublisher for AmqpPublisher {
    async fn publish(&self, envelope: &NotificationEnvelope) -> Result<(), QueueError> {
        let payload = envelope.encode_to_bytes();
        let queue = self.settings.queue_name.as_str();
        let mut guard = self.state.lock().await;

        let result = with_timeout_result(self.publish_timeout, async {
            let reopen = guard
                .as_ref()
                .map_or(true, |s| !s.channel.status().connected());
            if reopen {
                *guard = Some(open_channel(&self.settings).await?);
            }
            let state = guard
                .as_ref()
                .ok_or_else(|| QueueError::Unavailable("no AMQP channel".to_string()))?;

            declare_queue(&state.channel, queue).await?;
            let confirmation = state
                .channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default()
                        .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
                        .with_content_type(ENVELOPE_CONTENT_TYPE.into()),
                )
                .await?
                .await?;
            if confirmation.is_nack() {
                return Err(QueueError::NotConfirmed);
            }
            Ok::<(), QueueError>(())
        })
        .await;

        match result {
            Ok(()) => {
                info!(
                    recipient = %mask_email_for_logging(&envelope.recipient_email),
                    queue,
                    "Notification envelope published"
                );
                Ok(())
            }
            Err(e) => {
                // Drop the channel so the next publish starts clean
                *guard = None;
                let err = match e {
                    TimeoutError::Elapsed(after) => QueueError::Timeout(after),
                    TimeoutError::OperationFailed(inner) => inner,
                };
                warn!(
                    recipient = %mask_email_for_logging(&envelope.recipient_email),
                    error = %err,
                    "Failed to publish notification envelope"
                );
                Err(err)
            }
        }
    }
}

/// In-process publisher that records envelopes.
///
/// Used by tests and by the reminder dry-run; can be told to fail.
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<NotificationEnvelope>>,
    failing: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<NotificationEnvelope> {
        self.published.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }
}

#[async_trait]
impl EnvelopePublisher for MemoryPublisher {
    async fn publish(&self, envelope: &NotificationEnvelope) -> Result<(), QueueError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory publisher set to fail".to_string()));
        }
        self.published.lock().push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_publisher_records_and_fails_on_demand() {
        let publisher = MemoryPublisher::new();
        let envelope = NotificationEnvelope {
            recipient_email: "bob@example.com".into(),
            ..Default::default()
        };

        publisher.publish(&envelope).await.unwrap();
        publisher.set_failing(true);
        assert!(publisher.publish(&envelope).await.is_err());

        assert_eq!(publisher.count(), 1);
        assert_eq!(publisher.published()[0].recipient_email, "bob@example.com");
    }

    #[tokio::test]
    async fn test_unreachable_broker_times_out_as_transient() {
        let settings = AmqpSettings {
            host: "127.0.0.1".into(),
            port: 1,
            user: "guest".into(),
            password: "guest".into(),
            vhost: "/".into(),
            queue_name: "test".into(),
        };
        let publisher =
            AmqpPublisher::new(settings).with_publish_timeout(Duration::from_millis(500));

        let err = publisher
            .publish(&NotificationEnvelope::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
