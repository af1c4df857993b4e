//! Integration tests for sitebill-boq API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;
use sitebill_common::events::ProgressBus;
use tower::util::ServiceExt;
use uuid::Uuid;

/// Test helper: create test app with in-memory database
async fn create_test_app() -> (axum::Router, sqlx::SqlitePool, tempfile::TempDir) {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    sitebill_common::db::init_tables(&pool)
        .await
        .expect("Failed to initialize database schema");

    let uploads = tempfile::tempdir().expect("Failed to create temp dir");
    let storage = sitebill_boq::services::FileStorage::new(uploads.path().to_path_buf());
    let state = sitebill_boq::AppState::new(pool.clone(), storage, ProgressBus::new(100));
    let app = sitebill_boq::build_router(state);

    (app, pool, uploads)
}

async fn insert_project(pool: &sqlx::SqlitePool, project_id: Uuid, title: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO projects (id, title, start_date, end_date, total_budget, created_at, updated_at)
        VALUES (?, ?, '2026-03-01', '2026-11-30', 0, ?, ?)
        "#,
    )
    .bind(project_id.to_string())
    .bind(title)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("Failed to insert project");
}

/// Build a multipart body with a CSV file part and optional extra text fields
fn multipart_body(csv: &str, fields: &[(&str, &str)]) -> (String, Vec<u8>) {
    let boundary = "sitebill-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\ncontent-disposition: form-data; name=\"file\"; filename=\"bill.csv\"\r\ncontent-type: text/csv\r\n\r\n{csv}\r\n"
        )
        .as_bytes(),
    );
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\ncontent-disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

const SAMPLE_CSV: &str = "\
Description,Unit,Qty,Rate,Amount\n\
Excavation,m3,10,50,500\n\
Blockwork walls,m2,20,40,800\n\
TOTAL,,,,1300\n";

#[tokio::test]
async fn test_health_check() {
    let (app, _pool, _uploads) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "sitebill-boq");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_preview_parses_without_persisting() {
    let (app, pool, _uploads) = create_test_app().await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/boq/preview")
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    assert_eq!(json["total_amount"], 1300.0);
    assert_eq!(json["metadata"]["file_type"], "csv");
    // Flattened grid mirrors the items
    assert_eq!(json["grid"].as_array().unwrap().len(), 2);
    assert_eq!(json["grid"][0]["description"], "Excavation");
    assert_eq!(json["grid"][0]["is_billable"], true);

    // No persistence
    let headers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM project_boqs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(headers, 0);
    let phases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM phases")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(phases, 0);
}

#[tokio::test]
async fn test_preview_without_file_is_bad_request() {
    let (app, _pool, _uploads) = create_test_app().await;

    let boundary = "sitebill-test-boundary";
    let body = format!("--{boundary}--\r\n");
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/boq/preview")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_upload_materializes_draft_phases() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/boq", project_id))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_amount"], 1300.0);
    assert_eq!(json["tasks"].as_array().unwrap().len(), 0);

    // Drafts are listed for review
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/projects/{}/phases/drafts", project_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 2);
    let titles: Vec<&str> = json["phases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&"Excavation"));
    assert!(titles.contains(&"Blockwork walls"));
}

#[tokio::test]
async fn test_upload_to_unknown_project_is_not_found() {
    let (app, _pool, _uploads) = create_test_app().await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/boq", Uuid::new_v4()))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_sub_contractor_upload_requires_contractor_first() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[("boq_type", "sub_contractor")]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/boq", project_id))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_missing_items_diff_after_upload() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/boq", project_id))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Everything from the stored file is already materialized
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/projects/{}/boq/missing?boq_type=contractor",
                    project_id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 0);

    // Remove one phase; the diff should surface it again
    sqlx::query("DELETE FROM phases WHERE title = 'Excavation'")
        .execute(&pool)
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/projects/{}/boq/missing", project_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 1);
    assert_eq!(json["items"][0]["description"], "Excavation");
}

#[tokio::test]
async fn test_missing_items_without_upload_is_not_found() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/projects/{}/boq/missing", project_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_activate_drafts_flips_active_flag() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/boq", project_id))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/projects/{}/phases/drafts", project_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let ids: Vec<String> = json["phases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/phases/activate", project_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({ "phase_ids": ids })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["activated"], 2);

    // Nothing left in drafts
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/projects/{}/phases/drafts", project_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_activate_with_unknown_link_target_is_not_found() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/boq", project_id))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let draft_id: String = sqlx::query_scalar("SELECT id FROM phases LIMIT 1")
        .fetch_one(&pool)
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/phases/activate", project_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "phase_ids": [draft_id.clone()],
                        "links": { draft_id: Uuid::new_v4() },
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Nothing was activated
    let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM phases WHERE is_active = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(active, 0);
}

#[tokio::test]
async fn test_activate_batch_with_deleted_phase_activates_nothing() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let (content_type, body) = multipart_body(SAMPLE_CSV, &[]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/boq", project_id))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM phases ORDER BY title")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    // One phase disappears before the batch lands
    sqlx::query("DELETE FROM phases WHERE id = ?")
        .bind(&ids[0])
        .execute(&pool)
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/phases/activate", project_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({ "phase_ids": ids })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // All-or-nothing: the surviving phase is still a draft
    let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM phases WHERE is_active = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(active, 0);
}

#[tokio::test]
async fn test_activate_unknown_phase_activates_nothing() {
    let (app, pool, _uploads) = create_test_app().await;
    let project_id = Uuid::new_v4();
    insert_project(&pool, project_id, "Depot").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/projects/{}/phases/activate", project_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({ "phase_ids": [Uuid::new_v4()] })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
