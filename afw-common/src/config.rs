//! Configuration loading and root folder resolution
//!
//! A missing config file is never fatal: defaults apply and a warning is
//! logged. Root folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `AFW_ROOT_FOLDER`
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "AFW_ROOT_FOLDER";

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub root_folder: Option<PathBuf>,
    /// Database file name, relative to the root folder
    pub database_file: String,
    /// Optional TOML file replacing built-in entity specs by name
    pub entity_spec_file: Option<PathBuf>,
    pub log_level: String,
    pub query: QueryLimits,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub reactions: ReactionConfig,
    pub sessions: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5780,
            root_folder: None,
            database_file: "afw.db".to_string(),
            entity_spec_file: None,
            log_level: "info".to_string(),
            query: QueryLimits::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            reactions: ReactionConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

/// Pagination bounds. Requests outside them are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub default_limit: i64,
    pub max_limit: i64,
    pub max_offset: i64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
            max_offset: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Per-user request budget; 0 disables limiting
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    /// Compare-and-swap attempts before a toggle reports a conflict
    pub max_retries: u32,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 * 14 }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from the platform config file when
    /// no path is given. Missing files yield defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => {
                    warn!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Resolve the root folder following the documented priority order
    pub fn resolve_root_folder(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.root_folder {
            return path.clone();
        }

        default_root_folder()
    }

    /// Database file inside the given root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database_file)
    }

    /// Entity spec file, resolved relative to the root folder when relative
    pub fn entity_spec_path(&self, root_folder: &Path) -> Option<PathBuf> {
        self.entity_spec_file.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                root_folder.join(p)
            }
        })
    }
}

/// Platform config file, if one exists
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("afw").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/afw/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\afw
        dirs::data_local_dir()
            .map(|d| d.join("afw"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\afw"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/afw
        dirs::data_dir()
            .map(|d| d.join("afw"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/afw"))
    } else {
        // ~/.local/share/afw
        dirs::data_local_dir()
            .map(|d| d.join("afw"))
            .unwrap_or_else(|| PathBuf::from("./afw_data"))
    }
}
