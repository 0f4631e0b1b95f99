//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`LCH_ROOT_FOLDER`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing config file is not an error; the compiled defaults apply.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LCH_ROOT_FOLDER";

/// Default database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "lch.db";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5790;

/// `[server]` table of the TOML config
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// `[logging]` table of the TOML config
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "lch_admin=debug"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Service configuration read from `config.toml`
///
/// Every field is optional in the file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub root_folder: Option<PathBuf>,
    pub database_file: Option<String>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the platform config file
    ///
    /// No file yields the defaults; a file that cannot be read or parsed is
    /// an error so the caller can report it once logging is up.
    pub fn load_default_location() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::from_file(&path)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            None => Ok(Self::default()),
        }
    }

    /// Database file name, defaulting to `lch.db`
    pub fn database_file(&self) -> &str {
        self.database_file
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_DATABASE_FILE)
    }
}

/// Resolve the root folder that holds the database
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &ServiceConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Full database path for a resolved root folder
pub fn database_path(root_folder: &Path, config: &ServiceConfig) -> PathBuf {
    root_folder.join(config.database_file())
}

/// Locate the config file for the platform, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("lch").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/lch/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("lch"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\lch"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("lch"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/lch"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("lch"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/lch"))
    }
}
