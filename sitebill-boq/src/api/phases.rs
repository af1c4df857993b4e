//! Draft phase review endpoints: listing and batch activation

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sitebill_common::db::models::Phase;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::db::phases;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Build phase review routes
pub fn phase_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:project_id/phases/drafts", get(list_drafts))
        .route("/projects/:project_id/phases/activate", post(activate_phases))
}

#[derive(Debug, Serialize)]
struct DraftsResponse {
    phases: Vec<Phase>,
    count: usize,
}

/// GET /projects/:project_id/phases/drafts
async fn list_drafts(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<DraftsResponse>> {
    let phases = phases::list_drafts(&state.db, project_id).await?;
    Ok(Json(DraftsResponse {
        count: phases.len(),
        phases,
    }))
}

#[derive(Debug, Deserialize)]
struct ActivateRequest {
    phase_ids: Vec<Uuid>,
    /// Optional cross-type links: phase id -> counterpart phase id
    #[serde(default)]
    links: HashMap<Uuid, Uuid>,
}

#[derive(Debug, Serialize)]
struct ActivateResponse {
    activated: usize,
}

/// POST /projects/:project_id/phases/activate
///
/// Batch activation is atomic: an unknown phase id fails the whole
/// request and activates nothing.
async fn activate_phases(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<ActivateRequest>,
) -> ApiResult<Json<ActivateResponse>> {
    if request.phase_ids.is_empty() {
        return Err(ApiError::BadRequest("phase_ids is empty".to_string()));
    }

    // Validate the whole batch before touching anything
    let mut titles: Vec<(Uuid, String)> = Vec::with_capacity(request.phase_ids.len());
    for phase_id in &request.phase_ids {
        let phase = phases::get_phase(&state.db, *phase_id)
            .await?
            .filter(|p| p.project_id == project_id)
            .ok_or_else(|| ApiError::NotFound(format!("Phase {} not found", phase_id)))?;
        titles.push((*phase_id, phase.title));
    }
    for (phase_id, target_id) in &request.links {
        phases::get_phase(&state.db, *target_id)
            .await?
            .filter(|p| p.project_id == project_id)
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "Link target {} for phase {} not found",
                    target_id, phase_id
                ))
            })?;
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(sitebill_common::Error::from)?;
    for phase_id in &request.phase_ids {
        let link = request.links.get(phase_id).copied();
        let hit = phases::activate_phase(&mut tx, project_id, *phase_id, link).await?;
        if !hit {
            // Deleted between validation and here; fail the whole batch
            return Err(ApiError::NotFound(format!("Phase {} not found", phase_id)));
        }
    }
    tx.commit().await.map_err(sitebill_common::Error::from)?;

    for (phase_id, title) in &titles {
        state.activity.log(
            Some(project_id),
            "phase_activated",
            Some(format!("{} ({})", title, phase_id)),
        );
    }

    info!(%project_id, activated = titles.len(), "Draft phases activated");
    Ok(Json(ActivateResponse {
        activated: titles.len(),
    }))
}
