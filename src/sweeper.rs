//! Recycle bin retention sweeper.
//!
//! Periodically purges recycle bin entries older than the retention period.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::StorageConfig;
use crate::file::FileStore;

/// Background task that enforces the retention period.
pub struct RetentionSweeper {
    store: Arc<FileStore>,
    retention: Duration,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<FileStore>, retention: Duration, sweep_interval: Duration) -> Self {
        Self {
            store,
            retention,
            sweep_interval,
        }
    }

    pub fn from_config(store: Arc<FileStore>, config: &StorageConfig) -> Self {
        Self::new(store, config.retention(), config.sweep_interval())
    }

    /// Run forever, sweeping once per interval.
    ///
    /// The first sweep happens one interval after start.
    pub async fn run(&self) {
        info!(
            retention_secs = self.retention.as_secs(),
            interval_secs = self.sweep_interval.as_secs(),
            "Retention sweeper started"
        );

        let mut timer = interval(self.sweep_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        timer.tick().await;

        loop {
            timer.tick().await;
            self.sweep_once().await;
        }
    }

    /// Purge expired entries now, returning how many were removed.
    pub async fn sweep_once(&self) -> usize {
        match self.store.purge_older_than(self.retention).await {
            Ok(0) => {
                debug!("Retention sweep: nothing expired");
                0
            }
            Ok(count) => {
                info!(purged_count = count, "Purged expired recycle bin entries");
                count
            }
            Err(e) => {
                error!(error = %e, "Retention sweep failed");
                0
            }
        }
    }
}

/// Spawn the sweeper on the current runtime.
pub fn start_retention_sweeper(store: Arc<FileStore>, config: &StorageConfig) -> JoinHandle<()> {
    let sweeper = RetentionSweeper::from_config(store, config);
    tokio::spawn(async move {
        sweeper.run().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_with_recycled(names: &[&str]) -> (TempDir, Arc<FileStore>) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(
            temp_dir.path().join("server_files"),
            temp_dir.path().join("recycle_bin"),
        )
        .await
        .unwrap();
        for name in names {
            let mut reader = &b"data"[..];
            store.put(name, &mut reader, 4).await.unwrap();
            store.soft_delete(name).await.unwrap();
        }
        (temp_dir, Arc::new(store))
    }

    #[tokio::test]
    async fn test_from_config() {
        let (_temp_dir, store) = store_with_recycled(&[]).await;
        let config = StorageConfig {
            retention_days: 2,
            sweep_interval_secs: 60,
            ..StorageConfig::default()
        };

        let sweeper = RetentionSweeper::from_config(store, &config);
        assert_eq!(sweeper.retention, Duration::from_secs(2 * 86_400));
        assert_eq!(sweeper.sweep_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_sweep_once_respects_retention() {
        let (_temp_dir, store) = store_with_recycled(&["a.txt"]).await;

        let keep = RetentionSweeper::new(
            Arc::clone(&store),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        assert_eq!(keep.sweep_once().await, 0);
        assert_eq!(store.list_recycled("").await.unwrap(), vec!["a.txt"]);

        let purge = RetentionSweeper::new(Arc::clone(&store), Duration::ZERO, Duration::from_secs(60));
        assert_eq!(purge.sweep_once().await, 1);
        assert!(store.list_recycled("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_purges_on_interval() {
        let (_temp_dir, store) = store_with_recycled(&["a.txt", "b.txt"]).await;

        let sweeper = RetentionSweeper::new(
            Arc::clone(&store),
            Duration::ZERO,
            Duration::from_millis(50),
        );
        let handle = tokio::spawn(async move { sweeper.run().await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();

        assert!(store.list_recycled("").await.unwrap().is_empty());
        assert!(store.list_active("").await.unwrap().is_empty());
    }
}
