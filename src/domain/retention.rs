//! Background retention loop
//!
//! Deletes rows older than the configured retention on a fixed
//! interval. Errors are logged and the loop keeps running; the shutdown
//! signal ends the loop without logging the expected cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::data::store::Store;

pub fn start(
    store: Arc<Store>,
    retention: Duration,
    cleanup_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        // The immediate first tick would run cleanup at startup; skip it.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("Retention loop shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    match store.cleanup(retention).await {
                        Ok(deleted) if deleted > 0 => {
                            tracing::info!(deleted, "Cleanup completed");
                        }
                        Ok(_) => {
                            tracing::debug!("Cleanup completed, nothing to delete");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Cleanup failed");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::test_support::open_temp_store;
    use crate::data::store::MetricRecord;

    #[tokio::test]
    async fn test_retention_loop_deletes_expired_rows() {
        let (_dir, store) = open_temp_store().await;
        let store = Arc::new(store);

        store
            .insert_batch(
                &[],
                &[MetricRecord::new("old.metric", 1.0, 100, "{}")],
            )
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = start(
            store.clone(),
            Duration::from_secs(60),
            Duration::from_millis(20),
            rx,
        );

        // Give the loop a couple of ticks to run cleanup
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.metric_count, 0);
    }

    #[tokio::test]
    async fn test_retention_loop_stops_on_shutdown() {
        let (_dir, store) = open_temp_store().await;
        let (tx, rx) = watch::channel(false);

        let handle = start(
            Arc::new(store),
            Duration::from_secs(60),
            Duration::from_secs(3600),
            rx,
        );

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should exit promptly on shutdown")
            .unwrap();
    }
}
