//! Fire-and-forget activity logging
//!
//! A failed log write must never fail the operation being logged; the
//! insert runs on its own task and only warns on error.

use crate::db::activities;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ActivityLogger {
    pool: SqlitePool,
}

impl ActivityLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record an activity without blocking or failing the caller
    pub fn log(&self, project_id: Option<Uuid>, action: &str, detail: Option<String>) {
        let pool = self.pool.clone();
        let action = action.to_string();
        tokio::spawn(async move {
            if let Err(e) =
                activities::insert_activity(&pool, project_id, &action, detail.as_deref()).await
            {
                tracing::warn!("Failed to record activity '{}': {}", action, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_is_best_effort_and_eventually_lands() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sitebill_common::db::init_tables(&pool).await.unwrap();

        let logger = ActivityLogger::new(pool.clone());
        logger.log(None, "boq_uploaded", Some("bill.csv".to_string()));

        // The spawned insert races this query; poll briefly
        for _ in 0..50 {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
                .fetch_one(&pool)
                .await
                .unwrap();
            if count == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("activity row never appeared");
    }
}
