//! Notification service
//!
//! Consumes notification envelopes from AMQP and delivers them over SMTP,
//! and runs the reminder scheduler that queues reminders for unviewed
//! messages.

pub mod config;
pub mod consumer;
pub mod error;
pub mod mailer;
pub mod metrics;
pub mod processor;
pub mod reminder;
pub mod server;
pub mod storage;
pub mod templates;

pub mod pb {
    pub mod storage {
        tonic::include_proto!("passwordexchange.storage.v1");
    }
}

pub use consumer::QueueConsumer;
pub use processor::{DeliveryProcessor, Disposition};
pub use reminder::{ReminderScheduler, TickSummary};
