//! Notification queue plumbing
//!
//! Producers (Frontend submit path, reminder scheduler) publish a
//! [`NotificationEnvelope`] to a single durable AMQP queue; the Notification
//! service consumes it. Bodies are protobuf with stable field tags so older
//! consumers keep decoding newer envelopes.

pub mod config;
pub mod envelope;
pub mod error;
pub mod publisher;
pub mod topology;

pub use config::AmqpSettings;
pub use envelope::{NotificationEnvelope, TemplateKind};
pub use error::QueueError;
pub use publisher::{AmqpPublisher, EnvelopePublisher, MemoryPublisher};

/// Content type carried on every published envelope
pub const ENVELOPE_CONTENT_TYPE: &str = "application/protobuf";
