//! Phase materialization
//!
//! Turns parsed BOQ items into draft phases inside one transaction.
//! Ordering is the crash-safety contract: the new file is written
//! before the transaction commits, the old file is deleted only after,
//! and a failure rolls everything back, removes the new file, and
//! records `failed` on the header outside the dead transaction.

use crate::db::{boqs, phases, projects};
use crate::models::BoqItem;
use crate::services::{ActivityLogger, FileStorage};
use sitebill_common::db::models::{BoqStatus, BoqType, Phase, PhaseStatus};
use sitebill_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use uuid::Uuid;

/// Physical file accompanying a materialization request
///
/// JSON/row-array callers may omit it; the header then keeps its
/// previous file attributes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MaterializeOutcome {
    pub header_id: Uuid,
    pub phases_created: usize,
    pub total_amount: f64,
}

#[derive(Clone)]
pub struct PhaseMaterializer {
    pool: SqlitePool,
    storage: FileStorage,
    activity: ActivityLogger,
}

impl PhaseMaterializer {
    pub fn new(pool: SqlitePool, storage: FileStorage, activity: ActivityLogger) -> Self {
        Self {
            pool,
            storage,
            activity,
        }
    }

    /// Materialize parsed items into draft phases for (project, type)
    pub async fn materialize(
        &self,
        project_id: Uuid,
        boq_type: BoqType,
        items: &[BoqItem],
        upload: Option<UploadedFile>,
        total_amount: f64,
    ) -> Result<MaterializeOutcome> {
        let project = projects::get_project(&self.pool, project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Project {} not found", project_id)))?;

        if boq_type == BoqType::SubContractor {
            let contractor = boqs::find_header(&self.pool, project_id, BoqType::Contractor).await?;
            let processed = contractor
                .map(|h| h.status == BoqStatus::Processed)
                .unwrap_or(false);
            if !processed {
                return Err(Error::Precondition(
                    "Sub-contractor BOQ requires a processed contractor BOQ".to_string(),
                ));
            }
        }

        let previous = boqs::find_header(&self.pool, project_id, boq_type).await?;
        let old_file_path = previous.and_then(|h| h.file_path);

        // Durable write before the transaction; deleted again on failure
        let stored = match &upload {
            Some(file) => {
                let path = self
                    .storage
                    .store(project_id, boq_type, &file.file_name, &file.bytes)
                    .await?;
                Some((path, file.file_name.clone(), file.mimetype.clone(), file.bytes.len() as i64))
            }
            None => None,
        };

        let header_file = stored.as_ref().map(|(path, name, mime, size)| boqs::HeaderFile {
            file_name: name.clone(),
            file_path: path.to_string_lossy().to_string(),
            file_mimetype: mime.clone(),
            file_size: *size,
        });

        let result = self
            .materialize_tx(
                project_id,
                boq_type,
                items,
                header_file.as_ref(),
                total_amount,
                project.start_date.clone(),
                project.end_date.clone(),
            )
            .await;

        match result {
            Ok(outcome) => {
                // Old file only goes after commit; a crash in between
                // leaves one harmless orphan
                if let Some(old) = old_file_path {
                    let new_path = header_file.as_ref().map(|f| f.file_path.as_str());
                    if new_path.is_some() && new_path != Some(old.as_str()) {
                        if let Err(e) = self.storage.delete(&PathBuf::from(&old)).await {
                            tracing::warn!("Failed to delete replaced BOQ file {}: {}", old, e);
                        }
                    }
                }

                let file_name = header_file
                    .as_ref()
                    .map(|f| f.file_name.as_str())
                    .unwrap_or("(rows)");
                self.activity.log(
                    Some(project_id),
                    "boq_uploaded",
                    Some(format!(
                        "{}: {} phases, total {:.2}",
                        file_name, outcome.phases_created, outcome.total_amount
                    )),
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Some((path, ..)) = &stored {
                    if let Err(del) = self.storage.delete(path).await {
                        tracing::warn!(
                            "Failed to delete new BOQ file after rollback {}: {}",
                            path.display(),
                            del
                        );
                    }
                }
                // Best-effort side record outside the rolled-back transaction
                if let Err(mark) =
                    boqs::mark_failed(&self.pool, project_id, boq_type, &e.to_string()).await
                {
                    tracing::warn!("Failed to mark BOQ header failed: {}", mark);
                }
                self.activity.log(
                    Some(project_id),
                    "boq_failed",
                    Some(e.to_string()),
                );
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize_tx(
        &self,
        project_id: Uuid,
        boq_type: BoqType,
        items: &[BoqItem],
        header_file: Option<&boqs::HeaderFile>,
        total_amount: f64,
        project_start: Option<String>,
        project_end: Option<String>,
    ) -> Result<MaterializeOutcome> {
        let mut tx = self.pool.begin().await?;

        let header_id =
            boqs::upsert_processing(&mut tx, project_id, boq_type, header_file).await?;

        let mut seen = phases::existing_titles(&mut tx, project_id, boq_type).await?;
        let contractor_map = if boq_type == BoqType::SubContractor {
            phases::contractor_title_map(&mut tx, project_id).await?
        } else {
            Default::default()
        };

        let mut created = 0usize;
        for item in items.iter().filter(|i| passes_strict_gate(i)) {
            let key = phases::normalize_title(&item.description);
            if !seen.insert(key.clone()) {
                continue;
            }
            let phase = derive_phase(
                project_id,
                boq_type,
                item,
                contractor_map.get(&key).copied(),
                project_start.clone(),
                project_end.clone(),
            );
            phases::insert_phase(&mut tx, &phase).await?;
            created += 1;
        }

        projects::update_total_budget(&mut tx, project_id, total_amount).await?;
        boqs::mark_processed(&mut tx, header_id, total_amount, created as i64).await?;

        tx.commit().await?;

        Ok(MaterializeOutcome {
            header_id,
            phases_created: created,
            total_amount,
        })
    }
}

/// The materialization gate is re-applied even to previewed items: a
/// caller may hand the materializer externally edited rows
fn passes_strict_gate(item: &BoqItem) -> bool {
    !item.description.trim().is_empty() && !item.unit.trim().is_empty() && item.quantity > 0.0
}

fn derive_phase(
    project_id: Uuid,
    boq_type: BoqType,
    item: &BoqItem,
    linked_phase_id: Option<Uuid>,
    start_date: Option<String>,
    end_date: Option<String>,
) -> Phase {
    let description = match (&item.section, &item.sub_section) {
        (Some(section), Some(sub)) => Some(format!("{} / {}", section, sub)),
        (Some(section), None) => Some(section.clone()),
        (None, Some(sub)) => Some(sub.clone()),
        (None, None) => None,
    };
    let now = chrono::Utc::now();
    Phase {
        id: Uuid::new_v4(),
        project_id,
        title: item.description.trim().to_string(),
        description,
        budget: item.amount,
        status: PhaseStatus::NotStarted,
        is_active: false,
        from_boq: true,
        source_boq_type: Some(boq_type),
        parent_phase_id: None,
        linked_phase_id,
        start_date,
        end_date,
        created_at: now,
        updated_at: now,
    }
}

/// Missing-items diff: previewed/parsed items whose normalized
/// description matches no already-materialized phase title
pub async fn missing_items(
    pool: &SqlitePool,
    project_id: Uuid,
    boq_type: BoqType,
    items: Vec<BoqItem>,
) -> Result<Vec<BoqItem>> {
    let mut tx = pool.begin().await?;
    let existing: HashSet<String> = phases::existing_titles(&mut tx, project_id, boq_type).await?;
    tx.commit().await?;

    Ok(items
        .into_iter()
        .filter(|item| {
            passes_strict_gate(item)
                && !existing.contains(&phases::normalize_title(&item.description))
        })
        .collect())
}
