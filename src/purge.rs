//! Background removal of expired pastes.
//!
//! Reads already hide expired pastes, so the sweep only reclaims storage.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::controllers::paste;
use crate::db::Database;

/// Handle to the running sweep. Dropping it stops the sweep.
pub struct PurgeTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PurgeTask {
    /// Start sweeping according to `config`, or return `None` when the sweep is disabled.
    pub fn start(database: Database, config: &config::Purge) -> Option<Self> {
        if config.interval_secs == 0 {
            info!("purge sweep disabled");
            return None;
        }

        let period = Duration::from_secs(config.interval_secs);
        info!("purging expired pastes every {}s", config.interval_secs);
        Some(Self::spawn(database, period))
    }

    /// Sweep every `period`, starting one period from now.
    pub fn spawn(database: Database, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(database, period, cancel.clone()));
        PurgeTask { cancel, handle }
    }

    /// Stop the sweep and wait for an in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!("purge task ended abnormally: {e}");
        }
    }
}

impl Drop for PurgeTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(database: Database, period: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // failures are reported and the next tick tries again
                if let Err(e) = paste::purge_expired(&database).await {
                    error!("purge sweep failed: {}", e.detail());
                }
            }
        }
    }

    debug!("purge sweep stopped");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::NewPaste;
    use crate::test_support::test_database;

    fn expired_paste(name: &str) -> NewPaste {
        NewPaste {
            name: name.to_owned(),
            content: "stale".to_owned(),
            mime: "text/plain".to_owned(),
            expires: Some(Utc::now().timestamp() - 5),
            delete_token: format!("token-{name}"),
        }
    }

    #[tokio::test]
    async fn sweep_removes_expired_rows() {
        let (db, _dir) = test_database().await;
        db.insert_paste(&expired_paste("a")).await.unwrap();
        db.insert_paste(&expired_paste("b")).await.unwrap();
        assert_eq!(db.count_rows().await, 2);

        let task = PurgeTask::spawn(db.clone(), Duration::from_millis(20));

        let mut remaining = db.count_rows().await;
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            remaining = db.count_rows().await;
        }
        assert_eq!(remaining, 0);

        task.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_sweeping() {
        let (db, _dir) = test_database().await;
        let task = PurgeTask::spawn(db.clone(), Duration::from_millis(10));
        task.shutdown().await;

        db.insert_paste(&expired_paste("late")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.count_rows().await, 1);
    }

    #[tokio::test]
    async fn failed_sweeps_keep_the_task_running() {
        let (db, _dir) = test_database().await;
        db.close().await;

        let task = PurgeTask::spawn(db, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.handle.is_finished());

        task.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_sweeping() {
        let (db, _dir) = test_database().await;
        let task = PurgeTask::spawn(db.clone(), Duration::from_millis(10));
        drop(task);

        // let the cancelled task observe the token
        tokio::time::sleep(Duration::from_millis(20)).await;
        db.insert_paste(&expired_paste("kept")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.count_rows().await, 1);
    }

    #[tokio::test]
    async fn zero_interval_disables_sweep() {
        let (db, _dir) = test_database().await;
        assert!(PurgeTask::start(db, &config::Purge { interval_secs: 0 }).is_none());
    }
}
