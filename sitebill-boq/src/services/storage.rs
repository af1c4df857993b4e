//! Durable storage for uploaded BOQ files
//!
//! Files land under `<uploads>/<project_id>/<boq_type>/<millis>_<name>`.
//! The timestamp prefix keeps re-uploads of the same file name distinct
//! so the old file can be deleted only after the new state is committed.

use sitebill_common::db::models::BoqType;
use sitebill_common::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileStorage {
    uploads_root: PathBuf,
}

impl FileStorage {
    pub fn new(uploads_root: PathBuf) -> Self {
        Self { uploads_root }
    }

    /// Write an uploaded file, returning its storage path
    pub async fn store(
        &self,
        project_id: Uuid,
        boq_type: BoqType,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let dir = self
            .uploads_root
            .join(project_id.to_string())
            .join(boq_type.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let safe_name = sanitize_file_name(file_name);
        let path = dir.join(format!(
            "{}_{}",
            chrono::Utc::now().timestamp_millis(),
            safe_name
        ));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Stored upload at {}", path.display());
        Ok(path)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Remove a stored file; missing files are not an error
    pub async fn delete(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Strip path separators and traversal segments from a client-supplied name
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_read_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let project_id = Uuid::new_v4();

        let path = storage
            .store(project_id, BoqType::Contractor, "bill.csv", b"a,b,c")
            .await
            .unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path
            .to_string_lossy()
            .contains(&format!("{}/contractor/", project_id)));

        let bytes = storage.read(&path).await.unwrap();
        assert_eq!(bytes, b"a,b,c");

        storage.delete(&path).await.unwrap();
        assert!(!path.exists());
        // Second delete is a no-op
        storage.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn client_names_cannot_escape_the_uploads_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());

        let path = storage
            .store(
                Uuid::new_v4(),
                BoqType::Contractor,
                "../../etc/passwd",
                b"x",
            )
            .await
            .unwrap();
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn empty_name_gets_a_placeholder() {
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("..."), "upload");
        assert_eq!(sanitize_file_name("bill.csv"), "bill.csv");
    }
}
