//! Configuration loading and root folder resolution
//!
//! The root folder holds the SQLite database and the `uploads/` tree for
//! persisted BOQ files. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SITEBILL_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no CLI argument is given
pub const ROOT_ENV_VAR: &str = "SITEBILL_ROOT";

/// Resolve the root data folder
pub fn resolve_root_folder(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = config_file_path() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get the configuration file path for the platform
fn config_file_path() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/sitebill/config.toml first, then /etc/sitebill/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("sitebill").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/sitebill/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("sitebill").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("sitebill"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/sitebill"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("sitebill"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/sitebill"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("sitebill"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\sitebill"))
    } else {
        PathBuf::from("./sitebill_data")
    }
}

/// Ensures the root folder and its substructure exist before startup
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder and the uploads tree if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.uploads_path())?;
        Ok(())
    }

    /// Path of the SQLite database inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root.join("sitebill.db")
    }

    /// Path of the uploads tree (persisted BOQ files)
    pub fn uploads_path(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
