//! sitebill-boq - BOQ Ingestion & Phase Materialization Microservice
//!
//! **Module Identity:**
//! - Name: sitebill-boq (BOQ Ingestion)
//! - Port: 5741
//!
//! Accepts Bill-of-Quantities uploads (CSV/XLSX), previews parsed items,
//! and materializes draft project phases. Integrates with the Sitebill UI
//! via HTTP REST + SSE.

use anyhow::Result;
use sitebill_common::events::ProgressBus;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sitebill_boq::services::FileStorage;
use sitebill_boq::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting sitebill-boq (BOQ Ingestion) microservice");
    info!("Port: 5741");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Resolve root folder (CLI arg > env > config file > default)
    let cli_root = std::env::args().nth(1);
    let root_folder = sitebill_common::config::resolve_root_folder(cli_root.as_deref());

    // Step 2: Create root folder directories if missing
    let initializer = sitebill_common::config::RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directories()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = sitebill_common::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Headers stuck in `processing` belong to a previous process
    let recovered = sitebill_boq::db::boqs::recover_interrupted(&db_pool).await?;
    if recovered > 0 {
        info!("Marked {} interrupted BOQ upload(s) as failed", recovered);
    }

    let storage = FileStorage::new(initializer.uploads_path());
    let progress = ProgressBus::new(100); // 100 event capacity per session

    // Create application state
    let state = AppState::new(db_pool, storage, progress);

    // Build router
    let app = sitebill_boq::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind("127.0.0.1:5741").await?;
    info!("Listening on http://127.0.0.1:5741");
    info!("Health check: http://127.0.0.1:5741/health");

    axum::serve(listener, app).await?;

    Ok(())
}
