use error_types::ServiceError;
use message_queue::QueueError;
use thiserror::Error;

/// Failures that stop the consumer
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Delivery channel closed unexpectedly")]
    ChannelClosed,

    #[error("Gave up reconnecting to the broker after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {name} is {size} bytes, limit is {limit}")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("template {name} contains forbidden content {pattern:?}")]
    Forbidden { name: String, pattern: &'static str },

    #[error("failed to read template {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile template {name}: {source}")]
    Compile {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("failed to render template: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Failures inside one reminder tick
#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("storage call failed: {0}")]
    Storage(#[from] ServiceError),

    #[error("storage circuit breaker is open")]
    CircuitOpen,

    #[error("reminder run cancelled")]
    Cancelled,

    #[error("failed to queue reminder: {0}")]
    Publish(#[from] QueueError),

    #[error("candidate has an invalid recipient address")]
    InvalidRecipient,

    #[error("all {failed} reminder candidates failed")]
    AllFailed { failed: usize },
}

impl ReminderError {
    /// Only transient storage failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ReminderError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }
}
