//! Database access for Sitebill
//!
//! Shared SQLite pool initialization and schema creation. All services
//! connect to the same `sitebill.db` inside the resolved root folder.

pub mod models;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to the SQLite database at `db_path`, creating it (and its
/// parent directory) if missing, then creates any missing tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create Sitebill tables if they don't exist
///
/// `project_boqs` carries the unique (project_id, boq_type) constraint:
/// re-uploading a BOQ of the same type updates the existing header row
/// instead of inserting a duplicate.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            start_date TEXT,
            end_date TEXT,
            total_budget REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_boqs (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            boq_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            file_name TEXT,
            file_path TEXT,
            file_mimetype TEXT,
            file_size INTEGER NOT NULL DEFAULT 0,
            total_amount REAL NOT NULL DEFAULT 0,
            phases_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(project_id, boq_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS phases (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            budget REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'not_started',
            is_active INTEGER NOT NULL DEFAULT 0,
            from_boq INTEGER NOT NULL DEFAULT 0,
            source_boq_type TEXT,
            parent_phase_id TEXT,
            linked_phase_id TEXT,
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            id TEXT PRIMARY KEY,
            project_id TEXT,
            action TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (projects, project_boqs, phases, activities)");

    Ok(())
}
