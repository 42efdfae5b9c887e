//! Scheduled cleanup tasks for expired data.

use crate::db::Database;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    match db.verification_tokens().delete_expired().await {
        Ok(count) if count > 0 => info!("cleaned up {} expired verification tokens", count),
        Ok(_) => {}
        Err(e) => error!("failed to clean up expired verification tokens: {}", e),
    }

    match db.flow_states().delete_expired().await {
        Ok(count) if count > 0 => info!("cleaned up {} expired oauth flow states", count),
        Ok(_) => {}
        Err(e) => error!("failed to clean up expired oauth flow states: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_cleanup_on_empty_database_is_a_no_op() {
        let db = Database::open(":memory:").await.unwrap();
        run_cleanup(&db).await;
    }
}
