//! Background deletion of consumed and expired messages

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::service::StorageService;
use std::time::Duration;

/// Run `cleanup_expired` every `interval` until `cancel` fires
pub fn spawn_cleanup_loop(
    store: StorageService,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Cleanup loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cleanup loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match store.cleanup_expired().await {
                        Ok(0) => {}
                        Ok(deleted) => info!(deleted, "Expired messages cleaned up"),
                        Err(e) => warn!(error = %e, "Cleanup of expired messages failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionSettings;
    use crate::db::InMemoryMessageRepository;
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_loop_cleans_and_stops_on_cancel() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        repo.seed_message("consumed", "", Utc::now(), 3, 3);
        let store = StorageService::new(repo.clone(), RetentionSettings::default());

        let cancel = CancellationToken::new();
        let handle = spawn_cleanup_loop(store, Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(repo.raw_message("consumed").is_none());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
