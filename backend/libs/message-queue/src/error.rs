use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Publish timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Broker did not confirm the publish")]
    NotConfirmed,

    #[error("Malformed envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Publisher unavailable: {0}")]
    Unavailable(String),
}

impl QueueError {
    /// Every queue failure except a malformed body is worth retrying
    pub fn is_transient(&self) -> bool {
        !matches!(self, QueueError::Decode(_))
    }
}
