//! Queue declaration shared by producers and consumers.

use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Queue};

/// Durable, not exclusive, not auto-delete
pub fn queue_options() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        exclusive: false,
        auto_delete: false,
        ..Default::default()
    }
}

pub async fn declare_queue(channel: &Channel, name: &str) -> Result<Queue, lapin::Error> {
    channel
        .queue_declare(name, queue_options(), FieldTable::default())
        .await
}
