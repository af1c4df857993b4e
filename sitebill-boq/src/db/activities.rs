//! Append-only activity log

use sitebill_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Append one activity record
pub async fn insert_activity(
    pool: &SqlitePool,
    project_id: Option<Uuid>,
    action: &str,
    detail: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO activities (id, project_id, action, detail, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id.map(|id| id.to_string()))
    .bind(action)
    .bind(detail)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn insert_activity_appends_row() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sitebill_common::db::init_tables(&pool).await.unwrap();

        let project_id = Uuid::new_v4();
        insert_activity(&pool, Some(project_id), "boq_uploaded", Some("bill.csv: 4 phases"))
            .await
            .unwrap();
        insert_activity(&pool, None, "service_started", None)
            .await
            .unwrap();

        let rows = sqlx::query("SELECT project_id, action, detail FROM activities ORDER BY action")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let action: String = rows[0].get("action");
        assert_eq!(action, "boq_uploaded");
        let detail: Option<String> = rows[0].get("detail");
        assert_eq!(detail.as_deref(), Some("bill.csv: 4 phases"));
    }
}
