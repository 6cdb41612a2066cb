//! Configuration management for Lookbook
//!
//! Loads TOML configuration, applies profile and environment overrides, and
//! validates the result before anything opens an index.

use crate::error::{LookbookError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub rerank: RerankConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Write collections through to SQLite; in-memory only when false
    pub persist: bool,
}

/// Vector index configuration, shared by both collections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// "hnsw" or "flat"
    pub backend: String,
    pub text_collection: String,
    pub image_collection: String,
    pub text_dim: usize,
    pub image_dim: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    /// Rebuild the HNSW graph once deleted points exceed this share of live rows
    #[serde(default = "default_rebuild_ratio")]
    pub hnsw_rebuild_ratio: f32,
    pub max_elements: usize,
}

fn default_rebuild_ratio() -> f32 {
    0.5
}

/// Fusion search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub text_weight: f32,
    pub image_weight: f32,
    pub text_threshold: f32,
    pub image_threshold: f32,
    pub hybrid_text_threshold: f32,
    pub hybrid_image_threshold: f32,
    pub min_results: usize,
    pub oversample_factor: usize,
    pub min_candidates: usize,
}

/// Lexical rerank configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub vector_weight: f32,
    pub lexical_weight: f32,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub max_concurrent: usize,
    /// Use the exists-then-insert path instead of upsert
    pub skip_existing: bool,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LookbookError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LookbookError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LookbookError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| LookbookError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(weight) = overrides.text_weight {
            self.search.text_weight = weight;
        }
        if let Some(weight) = overrides.image_weight {
            self.search.image_weight = weight;
        }
        if let Some(threshold) = overrides.text_threshold {
            self.search.text_threshold = threshold;
        }
        if let Some(threshold) = overrides.image_threshold {
            self.search.image_threshold = threshold;
        }
        if let Some(backend) = overrides.backend {
            self.index.backend = backend;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LOOKBOOK_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LOOKBOOK_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "STORAGE__PERSIST" => {
                self.storage.persist = parse_env(path, value)?;
            }
            "INDEX__BACKEND" => {
                self.index.backend = value.to_string();
            }
            "INDEX__HNSW_REBUILD_RATIO" => {
                self.index.hnsw_rebuild_ratio = parse_env(path, value)?;
            }
            "SEARCH__TEXT_WEIGHT" => {
                self.search.text_weight = parse_env(path, value)?;
            }
            "SEARCH__IMAGE_WEIGHT" => {
                self.search.image_weight = parse_env(path, value)?;
            }
            "SEARCH__TEXT_THRESHOLD" => {
                self.search.text_threshold = parse_env(path, value)?;
            }
            "SEARCH__IMAGE_THRESHOLD" => {
                self.search.image_threshold = parse_env(path, value)?;
            }
            "INGEST__MAX_CONCURRENT" => {
                self.ingest.max_concurrent = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LookbookError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lookbook").join("config.toml"))
    }

    /// Data directory with a leading `~/` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| LookbookError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| LookbookError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| LookbookError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.lookbook"),
                persist: true,
            },
            index: IndexConfig {
                backend: "hnsw".to_string(),
                text_collection: "fashion_items_text".to_string(),
                image_collection: "fashion_items_image".to_string(),
                text_dim: 768,
                image_dim: 768,
                hnsw_m: 8,
                hnsw_ef_construction: 64,
                hnsw_ef_search: 250,
                hnsw_rebuild_ratio: default_rebuild_ratio(),
                max_elements: 100_000,
            },
            search: SearchConfig {
                text_weight: 0.5,
                image_weight: 0.5,
                text_threshold: 0.1,
                image_threshold: 0.1,
                hybrid_text_threshold: 0.7,
                hybrid_image_threshold: 0.7,
                min_results: 5,
                oversample_factor: 20,
                min_candidates: 200,
            },
            rerank: RerankConfig {
                vector_weight: 0.8,
                lexical_weight: 0.2,
            },
            ingest: IngestConfig {
                max_concurrent: 4,
                skip_existing: true,
            },
            profiles: HashMap::new(),
        }
    }
}
