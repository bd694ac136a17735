//! Bootstrap configuration: root folder resolution, TOML config, on-disk layout
//!
//! Root folder priority (highest first):
//! 1. Command-line argument
//! 2. `SBM_ROOT_FOLDER` environment variable
//! 3. `SBM_ROOT` environment variable
//! 4. `root_folder` key of the module's TOML config file
//! 5. OS-dependent compiled default
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Primary root folder environment variable
pub const ENV_ROOT_FOLDER: &str = "SBM_ROOT_FOLDER";

/// Alternative root folder environment variable
pub const ENV_ROOT: &str = "SBM_ROOT";

/// Directory name used under the platform data/config directories
const APP_DIR: &str = "sbm";

/// Built-in defaults used when nothing else is configured
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("./sbm_data"));

        Self {
            root_folder,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs go to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bootstrap keys shared by every module's TOML file
///
/// Module-specific sections are declared by the module itself and flattened
/// alongside these keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default TOML config path for a module: `<config_dir>/sbm/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(format!("{}.toml", module_name)))
}

/// Load a TOML config file, falling back to defaults
///
/// Missing file, unreadable file and parse failures all log a warning and
/// return `T::default()`.
pub fn load_toml_config<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return T::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file unreadable, using defaults");
            return T::default();
        }
    };

    match toml::from_str(&content) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file invalid, using defaults");
            T::default()
        }
    }
}

/// Write a TOML config file atomically with owner-only permissions on Unix
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| Error::Toml(e.to_string()))?;
    crate::persist::write_bytes_atomic(path, content.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    debug!(path = %path.display(), "Config file written");
    Ok(())
}

/// True if the TOML file is readable by group or others
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}

/// Resolves the root folder for one module
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_override: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_override: None,
            config_path: None,
        }
    }

    /// Root folder given on the command line, if any
    pub fn with_cli_override(mut self, path: Option<PathBuf>) -> Self {
        self.cli_override = path;
        self
    }

    /// Use an explicit TOML file instead of the module default
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn config_file_path(&self) -> Option<PathBuf> {
        self.config_path
            .clone()
            .or_else(|| default_config_path(&self.module_name))
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_override {
            info!(root_folder = %path.display(), source = "cli", "Root folder resolved");
            return path.clone();
        }

        for var in [ENV_ROOT_FOLDER, ENV_ROOT] {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    info!(root_folder = %value, source = var, "Root folder resolved");
                    return PathBuf::from(value);
                }
            }
        }

        if let Some(config_path) = self.config_file_path() {
            if config_path.exists() {
                let config: TomlConfig = load_toml_config(&config_path);
                if let Some(path) = config.root_folder {
                    info!(root_folder = %path.display(), source = "toml", "Root folder resolved");
                    return path;
                }
            }
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!(root_folder = %path.display(), source = "default", "Root folder resolved");
        path
    }
}

/// Creates the root folder tree and names the documents inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root_folder.join("data")
    }

    pub fn queue_state_path(&self) -> PathBuf {
        self.data_dir().join("queue_state.json")
    }

    pub fn download_history_path(&self) -> PathBuf {
        self.data_dir().join("download_history.json")
    }

    pub fn creation_history_path(&self) -> PathBuf {
        self.data_dir().join("song_creation_history.json")
    }

    /// Browser profiles, one directory per account (managed externally)
    pub fn profiles_dir(&self) -> PathBuf {
        self.root_folder.join("profiles")
    }

    pub fn profile_dir(&self, account_name: &str) -> PathBuf {
        self.profiles_dir().join(account_name)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root_folder.join("downloads")
    }

    /// Create root, data, profiles and downloads directories (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        for dir in [
            self.root_folder.clone(),
            self.data_dir(),
            self.profiles_dir(),
            self.downloads_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Config(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        debug!(root_folder = %self.root_folder.display(), "Root folder ready");
        Ok(())
    }
}
