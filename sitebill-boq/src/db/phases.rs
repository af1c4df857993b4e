//! Phase persistence
//!
//! Phases materialized from a BOQ carry `from_boq = 1` and the type of
//! the upload that created them. Dedup on re-upload and cross-type
//! linking both key on the normalized title.

use sitebill_common::db::models::{BoqType, Phase, PhaseStatus};
use sitebill_common::{Error, Result};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::projects::parse_timestamp;

/// Title normalization used for dedup and cross-type linking
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Insert a phase inside the caller's transaction
pub async fn insert_phase(tx: &mut Transaction<'_, Sqlite>, phase: &Phase) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO phases (
            id, project_id, title, description, budget, status, is_active,
            from_boq, source_boq_type, parent_phase_id, linked_phase_id,
            start_date, end_date, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(phase.id.to_string())
    .bind(phase.project_id.to_string())
    .bind(&phase.title)
    .bind(&phase.description)
    .bind(phase.budget)
    .bind(phase.status.as_str())
    .bind(phase.is_active)
    .bind(phase.from_boq)
    .bind(phase.source_boq_type.map(|t| t.as_str()))
    .bind(phase.parent_phase_id.map(|id| id.to_string()))
    .bind(phase.linked_phase_id.map(|id| id.to_string()))
    .bind(&phase.start_date)
    .bind(&phase.end_date)
    .bind(&phase.created_at.to_rfc3339())
    .bind(&phase.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Normalized titles of phases already materialized from the given BOQ
/// type, for skip-on-duplicate during re-upload
pub async fn existing_titles(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: Uuid,
    source_boq_type: BoqType,
) -> Result<HashSet<String>> {
    let rows = sqlx::query(
        r#"
        SELECT title FROM phases
        WHERE project_id = ? AND from_boq = 1 AND source_boq_type = ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(source_boq_type.as_str())
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let title: String = row.get("title");
            normalize_title(&title)
        })
        .collect())
}

/// Contractor-sourced phases keyed by normalized title, for linking
/// sub-contractor phases to their contractor counterparts
pub async fn contractor_title_map(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: Uuid,
) -> Result<HashMap<String, Uuid>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title FROM phases
        WHERE project_id = ? AND from_boq = 1 AND source_boq_type = ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(BoqType::Contractor.as_str())
    .fetch_all(&mut **tx)
    .await?;

    let mut map = HashMap::new();
    for row in rows {
        let id_str: String = row.get("id");
        let id = Uuid::parse_str(&id_str)
            .map_err(|e| Error::Internal(format!("Bad phase id: {}", e)))?;
        let title: String = row.get("title");
        // First occurrence wins on title collision
        map.entry(normalize_title(&title)).or_insert(id);
    }
    Ok(map)
}

/// Draft phases awaiting review: materialized from a BOQ, not yet activated
pub async fn list_drafts(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Phase>> {
    let rows = sqlx::query(
        r#"
        SELECT id, project_id, title, description, budget, status, is_active,
               from_boq, source_boq_type, parent_phase_id, linked_phase_id,
               start_date, end_date, created_at, updated_at
        FROM phases
        WHERE project_id = ? AND from_boq = 1 AND is_active = 0
        ORDER BY created_at, title
        "#,
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_phase).collect()
}

/// Load one phase by id
pub async fn get_phase(pool: &SqlitePool, phase_id: Uuid) -> Result<Option<Phase>> {
    let row = sqlx::query(
        r#"
        SELECT id, project_id, title, description, budget, status, is_active,
               from_boq, source_boq_type, parent_phase_id, linked_phase_id,
               start_date, end_date, created_at, updated_at
        FROM phases
        WHERE id = ?
        "#,
    )
    .bind(phase_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(map_phase).transpose()
}

/// Activate a draft phase, optionally linking it to its counterpart
///
/// Returns false if the phase does not exist or does not belong to the
/// project.
pub async fn activate_phase(
    tx: &mut Transaction<'_, Sqlite>,
    project_id: Uuid,
    phase_id: Uuid,
    linked_phase_id: Option<Uuid>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE phases
        SET is_active = 1,
            linked_phase_id = COALESCE(?, linked_phase_id),
            updated_at = ?
        WHERE id = ? AND project_id = ?
        "#,
    )
    .bind(linked_phase_id.map(|id| id.to_string()))
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(phase_id.to_string())
    .bind(project_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn map_phase(row: sqlx::sqlite::SqliteRow) -> Result<Phase> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| Error::Internal(format!("Bad phase id: {}", e)))?;
    let project_id_str: String = row.get("project_id");
    let project_id = Uuid::parse_str(&project_id_str)
        .map_err(|e| Error::Internal(format!("Bad project id: {}", e)))?;

    let status_str: String = row.get("status");
    let status = PhaseStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("Unknown phase status: {}", status_str)))?;

    let source_str: Option<String> = row.get("source_boq_type");
    let source_boq_type = match source_str {
        Some(s) => Some(
            BoqType::parse(&s)
                .ok_or_else(|| Error::Internal(format!("Unknown boq_type: {}", s)))?,
        ),
        None => None,
    };

    let parent_str: Option<String> = row.get("parent_phase_id");
    let parent_phase_id = parent_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Bad parent phase id: {}", e)))?;
    let linked_str: Option<String> = row.get("linked_phase_id");
    let linked_phase_id = linked_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Bad linked phase id: {}", e)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Phase {
        id,
        project_id,
        title: row.get("title"),
        description: row.get("description"),
        budget: row.get("budget"),
        status,
        is_active: row.get("is_active"),
        from_boq: row.get("from_boq"),
        source_boq_type,
        parent_phase_id,
        linked_phase_id,
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
pub(crate) fn test_phase(project_id: Uuid, title: &str, source: Option<BoqType>) -> Phase {
    let now = chrono::Utc::now();
    Phase {
        id: Uuid::new_v4(),
        project_id,
        title: title.to_string(),
        description: None,
        budget: 100.0,
        status: PhaseStatus::NotStarted,
        is_active: false,
        from_boq: true,
        source_boq_type: source,
        parent_phase_id: None,
        linked_phase_id: None,
        start_date: None,
        end_date: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sitebill_common::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn insert_and_round_trip() {
        let pool = test_pool().await;
        let project_id = Uuid::new_v4();
        let phase = test_phase(project_id, "Excavation", Some(BoqType::Contractor));

        let mut tx = pool.begin().await.unwrap();
        insert_phase(&mut tx, &phase).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = get_phase(&pool, phase.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Excavation");
        assert_eq!(loaded.source_boq_type, Some(BoqType::Contractor));
        assert!(loaded.from_boq);
        assert!(!loaded.is_active);
        assert_eq!(loaded.status, PhaseStatus::NotStarted);
    }

    #[tokio::test]
    async fn existing_titles_scoped_to_source_type() {
        let pool = test_pool().await;
        let project_id = Uuid::new_v4();

        let mut tx = pool.begin().await.unwrap();
        insert_phase(
            &mut tx,
            &test_phase(project_id, "Excavation", Some(BoqType::Contractor)),
        )
        .await
        .unwrap();
        insert_phase(
            &mut tx,
            &test_phase(project_id, "Plumbing", Some(BoqType::SubContractor)),
        )
        .await
        .unwrap();

        let titles = existing_titles(&mut tx, project_id, BoqType::Contractor)
            .await
            .unwrap();
        assert!(titles.contains("excavation"));
        assert!(!titles.contains("plumbing"));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn contractor_map_keys_normalized_titles() {
        let pool = test_pool().await;
        let project_id = Uuid::new_v4();
        let phase = test_phase(project_id, "  Brick Work ", Some(BoqType::Contractor));

        let mut tx = pool.begin().await.unwrap();
        insert_phase(&mut tx, &phase).await.unwrap();
        let map = contractor_title_map(&mut tx, project_id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(map.get("brick work"), Some(&phase.id));
    }

    #[tokio::test]
    async fn list_drafts_excludes_active_and_manual_phases() {
        let pool = test_pool().await;
        let project_id = Uuid::new_v4();

        let draft = test_phase(project_id, "Draft", Some(BoqType::Contractor));
        let mut active = test_phase(project_id, "Active", Some(BoqType::Contractor));
        active.is_active = true;
        let mut manual = test_phase(project_id, "Manual", None);
        manual.from_boq = false;

        let mut tx = pool.begin().await.unwrap();
        insert_phase(&mut tx, &draft).await.unwrap();
        insert_phase(&mut tx, &active).await.unwrap();
        insert_phase(&mut tx, &manual).await.unwrap();
        tx.commit().await.unwrap();

        let drafts = list_drafts(&pool, project_id).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Draft");
    }

    #[tokio::test]
    async fn activate_sets_flag_and_link() {
        let pool = test_pool().await;
        let project_id = Uuid::new_v4();
        let counterpart = Uuid::new_v4();
        let phase = test_phase(project_id, "Roofing", Some(BoqType::SubContractor));

        let mut tx = pool.begin().await.unwrap();
        insert_phase(&mut tx, &phase).await.unwrap();
        let hit = activate_phase(&mut tx, project_id, phase.id, Some(counterpart))
            .await
            .unwrap();
        assert!(hit);
        // Wrong project does not match
        let miss = activate_phase(&mut tx, Uuid::new_v4(), phase.id, None)
            .await
            .unwrap();
        assert!(!miss);
        tx.commit().await.unwrap();

        let loaded = get_phase(&pool, phase.id).await.unwrap().unwrap();
        assert!(loaded.is_active);
        assert_eq!(loaded.linked_phase_id, Some(counterpart));
    }

}
