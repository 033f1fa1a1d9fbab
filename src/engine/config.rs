//! docdex Configuration Module
//! Handles loading and validating docdex.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::people;
use super::schema::EntityType;

pub const CONFIG_FILE: &str = "docdex.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub project: ProjectConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub index: IndexConfig,
    /// Entity types registered at startup
    #[serde(default)]
    pub entities: Vec<EntityType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file, relative to the project directory
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Edge length of a geo grid cell in degrees
    #[serde(default = "default_geo_cell_degrees")]
    pub geo_cell_degrees: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            geo_cell_degrees: default_geo_cell_degrees(),
        }
    }
}

fn default_port() -> u16 {
    54330
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/docdex.db")
}

fn default_geo_cell_degrees() -> f64 {
    0.5
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project(name: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            project: ProjectConfig {
                name: name.to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                path: default_db_path(),
            },
            api: ApiConfig::default(),
            index: IndexConfig::default(),
            entities: vec![people::entity_type()],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cell = self.index.geo_cell_degrees;
        if !cell.is_finite() || cell <= 0.0 || cell > 90.0 {
            return Err(ConfigError::Invalid(format!(
                "index.geo_cell_degrees must be in (0, 90], got {}",
                cell
            )));
        }
        Ok(())
    }

    /// Absolute database path for a project
    pub fn db_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.storage.path)
    }
}
