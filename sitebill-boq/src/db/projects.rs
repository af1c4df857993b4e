//! Project lookup and budget cache updates
//!
//! Projects are owned by the wider product; this service reads them for
//! validation/date inheritance and writes only the cached total budget.

use sitebill_common::db::models::Project;
use sitebill_common::{Error, Result};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Load a project by id
pub async fn get_project(pool: &SqlitePool, project_id: Uuid) -> Result<Option<Project>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, start_date, end_date, total_budget, created_at, updated_at
        FROM projects
        WHERE id = ?
        "#,
    )
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(map_project).transpose()
}

/// Update the project's cached total budget inside the caller's transaction
///
/// The value is caller-supplied, not recomputed from created phases: the
/// caller's total may include rows that were filtered out (e.g. section
/// sub-totals).
pub async fn update_total_budget(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: Uuid,
    total_budget: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE projects
        SET total_budget = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(total_budget)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(project_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn map_project(row: sqlx::sqlite::SqliteRow) -> Result<Project> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| Error::Internal(format!("Failed to parse project id: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = parse_timestamp(&created_at)?;
    let updated_at: String = row.get("updated_at");
    let updated_at = parse_timestamp(&updated_at)?;

    Ok(Project {
        id,
        title: row.get("title"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        total_budget: row.get("total_budget"),
        created_at,
        updated_at,
    })
}

pub(crate) fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
pub(crate) async fn insert_test_project(
    pool: &SqlitePool,
    project_id: Uuid,
    title: &str,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO projects (id, title, start_date, end_date, total_budget, created_at, updated_at)
        VALUES (?, ?, '2026-01-01', '2026-12-31', 0, ?, ?)
        "#,
    )
    .bind(project_id.to_string())
    .bind(title)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_project_round_trips() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sitebill_common::db::init_tables(&pool).await.unwrap();

        let id = Uuid::new_v4();
        insert_test_project(&pool, id, "Riverside Apartments").await.unwrap();

        let project = get_project(&pool, id).await.unwrap().unwrap();
        assert_eq!(project.title, "Riverside Apartments");
        assert_eq!(project.start_date.as_deref(), Some("2026-01-01"));
        assert_eq!(project.total_budget, 0.0);

        assert!(get_project(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn budget_update_is_transactional() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sitebill_common::db::init_tables(&pool).await.unwrap();

        let id = Uuid::new_v4();
        insert_test_project(&pool, id, "Depot").await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        update_total_budget(&mut tx, id, 125_000.0).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(get_project(&pool, id).await.unwrap().unwrap().total_budget, 0.0);

        let mut tx = pool.begin().await.unwrap();
        update_total_budget(&mut tx, id, 125_000.0).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            get_project(&pool, id).await.unwrap().unwrap().total_budget,
            125_000.0
        );
    }
}
