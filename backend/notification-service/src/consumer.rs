//! AMQP consumer
//!
//! One connection, one channel per worker, prefetch 1 on each channel. A
//! worker finishes the delivery in hand before it looks at the shutdown
//! token. When any channel dies the whole session is torn down and rebuilt,
//! up to the configured number of consecutive reconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, Consumer};
use message_queue::topology::declare_queue;
use message_queue::AmqpSettings;
use resilience::RetryConfig;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::NotificationError;
use crate::processor::{DeliveryProcessor, Disposition};

/// Shared flag read by `/health`
#[derive(Debug, Clone, Default)]
pub struct ConsumerStatus(Arc<AtomicBool>);

impl ConsumerStatus {
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }
}

struct SessionError {
    /// The session reached the consuming state before failing
    established: bool,
    source: NotificationError,
}

impl SessionError {
    fn before_consuming(source: impl Into<NotificationError>) -> Self {
        Self {
            established: false,
            source: source.into(),
        }
    }
}

pub struct QueueConsumer {
    settings: AmqpSettings,
    workers: usize,
    reconnect_attempts: u32,
    backoff: RetryConfig,
    status: ConsumerStatus,
}

impl QueueConsumer {
    pub fn new(settings: AmqpSettings, workers: usize, reconnect_attempts: u32) -> Self {
        Self {
            settings,
            workers: workers.max(1),
            reconnect_attempts,
            backoff: RetryConfig::default(),
            status: ConsumerStatus::default(),
        }
    }

    pub fn status(&self) -> ConsumerStatus {
        self.status.clone()
    }

    /// Consume until `shutdown` fires. Returns an error once reconnecting
    /// has been given up.
    pub async fn run(
        &self,
        processor: Arc<DeliveryProcessor>,
        shutdown: CancellationToken,
    ) -> Result<(), NotificationError> {
        let mut attempts = 0u32;

        loop {
            let result = self.session(&processor, &shutdown).await;
            self.status.set(false);

            let failure = match result {
                Ok(()) => return Ok(()),
                Err(_) if shutdown.is_cancelled() => return Ok(()),
                Err(failure) => failure,
            };

            if failure.established {
                attempts = 0;
            }
            attempts += 1;
            if attempts > self.reconnect_attempts {
                error!(
                    attempts = self.reconnect_attempts,
                    error = %failure.source,
                    "Giving up on the broker"
                );
                return Err(NotificationError::ReconnectExhausted {
                    attempts: self.reconnect_attempts,
                });
            }

            let delay = self.backoff.backoff_for(attempts);
            warn!(
                attempt = attempts,
                max_attempts = self.reconnect_attempts,
                error = %failure.source,
                "AMQP session lost, reconnecting in {:?}",
                delay
            );
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn session(
        &self,
        processor: &Arc<DeliveryProcessor>,
        shutdown: &CancellationToken,
    ) -> Result<(), SessionError> {
        let connection = Connection::connect(&self.settings.uri(), ConnectionProperties::default())
            .await
            .map_err(SessionError::before_consuming)?;

        let mut consumers = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            match open_consumer(&connection, &self.settings.queue_name, worker).await {
                Ok(consumer) => consumers.push(consumer),
                Err(e) => {
                    close(&connection).await;
                    return Err(SessionError::before_consuming(e));
                }
            }
        }

        info!(
            host = %self.settings.host,
            queue = %self.settings.queue_name,
            workers = self.workers,
            "Consuming notification queue"
        );
        self.status.set(true);

        let stop = shutdown.child_token();
        let mut tasks = JoinSet::new();
        for (worker, consumer) in consumers.into_iter().enumerate() {
            tasks.spawn(run_worker(worker, consumer, processor.clone(), stop.clone()));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(NotificationError::from).and_then(|r| r);
            if let Err(e) = outcome {
                if first_error.is_none() {
                    // One dead channel takes the session down
                    stop.cancel();
                    first_error = Some(e);
                }
            }
        }

        close(&connection).await;

        match first_error {
            None => Ok(()),
            Some(source) => Err(SessionError {
                established: true,
                source,
            }),
        }
    }
}

async fn open_consumer(
    connection: &Connection,
    queue: &str,
    worker: usize,
) -> Result<Consumer, lapin::Error> {
    let channel = connection.create_channel().await?;
    channel.basic_qos(1, BasicQosOptions::default()).await?;
    declare_queue(&channel, queue).await?;
    channel
        .basic_consume(
            queue,
            &format!("notification-worker-{}", worker),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
}

async fn close(connection: &Connection) {
    if let Err(e) = connection.close(200, "consumer shutdown").await {
        debug!(error = %e, "Failed to close AMQP connection");
    }
}

async fn run_worker(
    worker: usize,
    mut consumer: Consumer,
    processor: Arc<DeliveryProcessor>,
    stop: CancellationToken,
) -> Result<(), NotificationError> {
    debug!(worker, "Notification worker started");

    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => {
                debug!(worker, "Notification worker stopping");
                return Ok(());
            }
            next = consumer.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(NotificationError::ChannelClosed),
        };

        handle_delivery(worker, &processor, delivery).await?;
    }
}

async fn handle_delivery(
    worker: usize,
    processor: &DeliveryProcessor,
    delivery: Delivery,
) -> Result<(), NotificationError> {
    match processor.process(&delivery.data).await {
        Disposition::Ack => {
            delivery.acker.ack(BasicAckOptions::default()).await?;
        }
        Disposition::Drop { reason } => {
            debug!(worker, reason, "Acking dropped delivery");
            delivery.acker.ack(BasicAckOptions::default()).await?;
        }
        Disposition::Requeue => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MockMailSender;
    use crate::templates::EmailTemplates;
    use std::time::Duration;

    fn unreachable() -> AmqpSettings {
        AmqpSettings {
            host: "127.0.0.1".into(),
            port: 1,
            user: "guest".into(),
            password: "guest".into(),
            vhost: "/".into(),
            queue_name: "test".into(),
        }
    }

    fn processor() -> Arc<DeliveryProcessor> {
        Arc::new(DeliveryProcessor::new(
            EmailTemplates::embedded().unwrap(),
            Arc::new(MockMailSender::new()),
            "https://password.exchange".into(),
        ))
    }

    #[tokio::test]
    async fn test_reconnect_is_bounded() {
        let mut consumer = QueueConsumer::new(unreachable(), 2, 2);
        consumer.backoff = RetryConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..RetryConfig::default()
        };

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            consumer.run(processor(), CancellationToken::new()),
        )
        .await
        .expect("reconnect loop did not terminate");

        assert!(matches!(
            result,
            Err(NotificationError::ReconnectExhausted { attempts: 2 })
        ));
        assert!(!consumer.status().is_connected());
    }

    #[tokio::test]
    async fn test_shutdown_stops_reconnecting() {
        let consumer = QueueConsumer::new(unreachable(), 1, 100);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            consumer.run(processor(), shutdown),
        )
        .await
        .expect("consumer ignored shutdown");
        assert!(result.is_ok());
    }
}
