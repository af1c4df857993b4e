//! BOQ upload endpoints: preview, materialize, missing-items diff

use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sitebill_common::db::models::BoqType;
use sitebill_common::events::{ProgressBus, ProgressEvent};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::db::boqs;
use crate::error::{ApiError, ApiResult};
use crate::models::{BoqItem, BoqParseResult};
use crate::parser::{BoqParser, ParseMode};
use crate::services::{materializer, UploadedFile};
use crate::AppState;

/// Build BOQ routes
pub fn boq_routes() -> Router<AppState> {
    Router::new()
        .route("/boq/preview", post(preview_boq))
        .route("/projects/:project_id/boq", post(upload_boq))
        .route("/projects/:project_id/boq/missing", get(missing_boq_items))
}

/// Decoded multipart upload form
struct UploadForm {
    file_name: String,
    mimetype: String,
    bytes: Vec<u8>,
    session_id: Option<String>,
    boq_type: BoqType,
}

async fn read_upload_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut session_id = None;
    let mut boq_type = BoqType::Contractor;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let file_name = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let mimetype = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((file_name, mimetype, bytes.to_vec()));
            }
            "session_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad session_id: {}", e)))?;
                if !value.trim().is_empty() {
                    session_id = Some(value.trim().to_string());
                }
            }
            "boq_type" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad boq_type: {}", e)))?;
                boq_type = BoqType::parse(value.trim()).ok_or_else(|| {
                    ApiError::BadRequest(format!("Unknown boq_type '{}'", value.trim()))
                })?;
            }
            _ => {}
        }
    }

    let (file_name, mimetype, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    Ok(UploadForm {
        file_name,
        mimetype,
        bytes,
        session_id,
        boq_type,
    })
}

/// Bridge the parser's sync progress channel into the session bus
fn progress_forwarder(
    bus: ProgressBus,
    session_id: String,
) -> mpsc::UnboundedSender<ProgressEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            bus.publish(&session_id, event).await;
        }
    });
    tx
}

/// Parse on a blocking thread; parsing is CPU-bound and single-pass
async fn parse_on_blocking_thread(
    bytes: Vec<u8>,
    file_name: String,
    mode: ParseMode,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
) -> ApiResult<BoqParseResult> {
    let result = tokio::task::spawn_blocking(move || {
        BoqParser::parse(&bytes, &file_name, mode, progress.as_ref())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Parse task failed: {}", e)))?;
    Ok(result?)
}

/// One denormalized preview row for grid display
#[derive(Debug, Serialize)]
struct GridRow {
    id: u32,
    description: String,
    unit: String,
    quantity: f64,
    rate: f64,
    amount: f64,
    section: String,
    sub_section: String,
    row_index: usize,
    is_billable: bool,
}

#[derive(Debug, Serialize)]
struct PreviewResponse {
    #[serde(flatten)]
    result: BoqParseResult,
    grid: Vec<GridRow>,
}

fn grid_view(items: &[BoqItem]) -> Vec<GridRow> {
    items
        .iter()
        .map(|item| GridRow {
            id: item.id,
            description: item.description.clone(),
            unit: item.unit.clone(),
            quantity: item.quantity,
            rate: item.rate,
            amount: item.amount,
            section: item.section.clone().unwrap_or_default(),
            sub_section: item.sub_section.clone().unwrap_or_default(),
            row_index: item.row_index,
            is_billable: item.is_billable,
        })
        .collect()
}

/// POST /boq/preview
///
/// Parse without persisting anything. Keeps gate-failing items in the
/// output (flagged) so the caller sees everything that was read.
async fn preview_boq(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let form = read_upload_form(multipart).await?;
    info!(file_name = %form.file_name, "BOQ preview requested");

    let progress = form
        .session_id
        .as_ref()
        .map(|sid| progress_forwarder(state.progress.clone(), sid.clone()));

    let parsed = parse_on_blocking_thread(
        form.bytes,
        form.file_name.clone(),
        ParseMode::Preview,
        progress,
    )
    .await;

    match parsed {
        Ok(result) => {
            let response = PreviewResponse {
                grid: grid_view(&result.items),
                result,
            };
            let payload = serde_json::to_value(&response)
                .map_err(|e| ApiError::Internal(format!("Failed to serialize preview: {}", e)))?;
            if let Some(sid) = &form.session_id {
                state
                    .progress
                    .publish(sid, ProgressEvent::Complete { payload: payload.clone() })
                    .await;
            }
            Ok(Json(payload))
        }
        Err(e) => {
            if let Some(sid) = &form.session_id {
                state
                    .progress
                    .publish(sid, ProgressEvent::Error { message: e.to_string() })
                    .await;
            }
            Err(e)
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    total_amount: f64,
    /// Intentionally always empty; kept for API compatibility with
    /// task-based clients
    tasks: Vec<serde_json::Value>,
}

/// POST /projects/:project_id/boq
///
/// Parse the upload, then materialize draft phases in one transaction.
async fn upload_boq(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let form = read_upload_form(multipart).await?;
    info!(
        %project_id,
        boq_type = form.boq_type.as_str(),
        file_name = %form.file_name,
        "BOQ upload requested"
    );

    let progress = form
        .session_id
        .as_ref()
        .map(|sid| progress_forwarder(state.progress.clone(), sid.clone()));

    let outcome = async {
        let parsed = parse_on_blocking_thread(
            form.bytes.clone(),
            form.file_name.clone(),
            ParseMode::Materialize,
            progress,
        )
        .await?;

        let upload = UploadedFile {
            file_name: form.file_name.clone(),
            mimetype: form.mimetype.clone(),
            bytes: form.bytes.clone(),
        };
        let outcome = state
            .materializer
            .materialize(
                project_id,
                form.boq_type,
                &parsed.items,
                Some(upload),
                parsed.total_amount,
            )
            .await?;
        Ok::<_, ApiError>(outcome)
    }
    .await;

    match outcome {
        Ok(outcome) => {
            let response = UploadResponse {
                message: format!(
                    "BOQ processed: {} phases created",
                    outcome.phases_created
                ),
                total_amount: outcome.total_amount,
                tasks: Vec::new(),
            };
            if let Some(sid) = &form.session_id {
                let payload = serde_json::json!({
                    "message": response.message,
                    "total_amount": response.total_amount,
                    "tasks": [],
                });
                state
                    .progress
                    .publish(sid, ProgressEvent::Complete { payload })
                    .await;
            }
            Ok(Json(response))
        }
        Err(e) => {
            if let Some(sid) = &form.session_id {
                state
                    .progress
                    .publish(sid, ProgressEvent::Error { message: e.to_string() })
                    .await;
            }
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct MissingQuery {
    boq_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct MissingResponse {
    items: Vec<BoqItem>,
    count: usize,
}

/// GET /projects/:project_id/boq/missing?boq_type=
///
/// Re-parse the stored file for the type and return items with no
/// matching phase title, so an operator can top up skipped rows.
async fn missing_boq_items(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<MissingQuery>,
) -> ApiResult<Json<MissingResponse>> {
    let boq_type = match query.boq_type.as_deref() {
        None => BoqType::Contractor,
        Some(raw) => BoqType::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown boq_type '{}'", raw)))?,
    };

    let header = boqs::find_header(&state.db, project_id, boq_type)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No {} BOQ uploaded for project {}",
                boq_type.as_str(),
                project_id
            ))
        })?;
    let file_path = header.file_path.ok_or_else(|| {
        ApiError::NotFound(format!("No stored file for {} BOQ", boq_type.as_str()))
    })?;
    let file_name = header.file_name.unwrap_or_else(|| "upload".to_string());

    let bytes = state
        .storage
        .read(&PathBuf::from(&file_path))
        .await
        .map_err(|_| ApiError::NotFound(format!("Stored BOQ file missing: {}", file_path)))?;

    let parsed =
        parse_on_blocking_thread(bytes, file_name, ParseMode::Materialize, None).await?;
    let items =
        materializer::missing_items(&state.db, project_id, boq_type, parsed.items).await?;

    Ok(Json(MissingResponse {
        count: items.len(),
        items,
    }))
}
