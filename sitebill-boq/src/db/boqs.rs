//! BOQ header persistence
//!
//! One `project_boqs` row conceptually owns the outcome of the most
//! recent upload of a given type for a given project. The
//! UNIQUE(project_id, boq_type) constraint plus upsert keep it that way:
//! re-upload updates the row, never duplicates it, and also serializes
//! two concurrent uploads for the same (project, type) on the row.

use sitebill_common::db::models::{BoqStatus, BoqType, ProjectBoq};
use sitebill_common::{Error, Result};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::projects::parse_timestamp;

/// Uploaded file attributes recorded on the header
#[derive(Debug, Clone)]
pub struct HeaderFile {
    pub file_name: String,
    pub file_path: String,
    pub file_mimetype: String,
    pub file_size: i64,
}

/// Find the BOQ header for (project, type)
pub async fn find_header(
    pool: &SqlitePool,
    project_id: Uuid,
    boq_type: BoqType,
) -> Result<Option<ProjectBoq>> {
    let row = sqlx::query(
        r#"
        SELECT id, project_id, boq_type, status, file_name, file_path,
               file_mimetype, file_size, total_amount, phases_count,
               error_message, created_at, updated_at
        FROM project_boqs
        WHERE project_id = ? AND boq_type = ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(boq_type.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(map_boq).transpose()
}

/// Create or update the header for (project, type), moving it to
/// `processing` and recording the new file attributes
///
/// Returns the header id. Existing rows are reused: only the file
/// attributes, status and error are refreshed.
pub async fn upsert_processing(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: Uuid,
    boq_type: BoqType,
    file: Option<&HeaderFile>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO project_boqs (
            id, project_id, boq_type, status, file_name, file_path,
            file_mimetype, file_size, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(project_id, boq_type) DO UPDATE SET
            status = excluded.status,
            file_name = COALESCE(excluded.file_name, file_name),
            file_path = COALESCE(excluded.file_path, file_path),
            file_mimetype = COALESCE(excluded.file_mimetype, file_mimetype),
            file_size = CASE WHEN excluded.file_name IS NULL THEN file_size ELSE excluded.file_size END,
            error_message = NULL,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id.to_string())
    .bind(project_id.to_string())
    .bind(boq_type.as_str())
    .bind(BoqStatus::Processing.as_str())
    .bind(file.map(|f| f.file_name.clone()))
    .bind(file.map(|f| f.file_path.clone()))
    .bind(file.map(|f| f.file_mimetype.clone()))
    .bind(file.map(|f| f.file_size).unwrap_or(0))
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;

    // The upsert may have kept the pre-existing row id
    let row = sqlx::query("SELECT id FROM project_boqs WHERE project_id = ? AND boq_type = ?")
        .bind(project_id.to_string())
        .bind(boq_type.as_str())
        .fetch_one(&mut **tx)
        .await?;
    let id_str: String = row.get("id");
    Uuid::parse_str(&id_str).map_err(|e| Error::Internal(format!("Bad header id: {}", e)))
}

/// Mark the header processed, recording the materialized totals
pub async fn mark_processed(
    tx: &mut Transaction<'_, Sqlite>,
    header_id: Uuid,
    total_amount: f64,
    phases_count: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE project_boqs
        SET status = ?, total_amount = ?, phases_count = ?,
            error_message = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(BoqStatus::Processed.as_str())
    .bind(total_amount)
    .bind(phases_count)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(header_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Best-effort failure record, deliberately outside any transaction
///
/// Called after a rollback so the header still tells the operator what
/// went wrong. Inserts the header if the failure happened before one
/// existed.
pub async fn mark_failed(
    pool: &SqlitePool,
    project_id: Uuid,
    boq_type: BoqType,
    message: &str,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO project_boqs (
            id, project_id, boq_type, status, error_message, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(project_id, boq_type) DO UPDATE SET
            status = excluded.status,
            error_message = excluded.error_message,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id.to_string())
    .bind(boq_type.as_str())
    .bind(BoqStatus::Failed.as_str())
    .bind(message)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Startup recovery: headers left in `processing` belong to a request
/// whose task died with the previous process and will never complete
pub async fn recover_interrupted(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE project_boqs
        SET status = ?, error_message = 'Processing interrupted by service restart', updated_at = ?
        WHERE status = ?
        "#,
    )
    .bind(BoqStatus::Failed.as_str())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(BoqStatus::Processing.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

fn map_boq(row: sqlx::sqlite::SqliteRow) -> Result<ProjectBoq> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| Error::Internal(format!("Bad header id: {}", e)))?;
    let project_id_str: String = row.get("project_id");
    let project_id = Uuid::parse_str(&project_id_str)
        .map_err(|e| Error::Internal(format!("Bad project id: {}", e)))?;

    let type_str: String = row.get("boq_type");
    let boq_type = BoqType::parse(&type_str)
        .ok_or_else(|| Error::Internal(format!("Unknown boq_type: {}", type_str)))?;
    let status_str: String = row.get("status");
    let status = BoqStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("Unknown boq status: {}", status_str)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ProjectBoq {
        id,
        project_id,
        boq_type,
        status,
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        file_mimetype: row.get("file_mimetype"),
        file_size: row.get("file_size"),
        total_amount: row.get("total_amount"),
        phases_count: row.get("phases_count"),
        error_message: row.get("error_message"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
