//! Storage layer for Lookbook
//!
//! Owns the data directory layout and the SQLite database that persists both
//! modality collections.

pub mod database;

use crate::error::{LookbookError, Result};
use std::path::{Path, PathBuf};

pub use database::{CollectionStats, Database, DbPool, DbStats};

/// Database file name inside the store directory
const DB_FILE: &str = "catalog.sqlite";

/// Storage manager for the catalog data directory
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    /// Create (or reopen) storage rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let store = base_path.join("store");
        std::fs::create_dir_all(&store).map_err(|e| LookbookError::Io {
            source: e,
            context: format!("Failed to create store directory: {}", store.display()),
        })?;

        let database = Database::new(&store.join(DB_FILE))?;

        Ok(Self {
            database,
            base_path,
        })
    }

    /// Directory holding the database files
    pub fn store_dir(&self) -> PathBuf {
        self.base_path.join("store")
    }

    pub fn db_path(&self) -> PathBuf {
        self.store_dir().join(DB_FILE)
    }

    /// Get combined storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            db: self.database.stats()?,
            store_size: Self::dir_size(&self.store_dir())?,
        })
    }

    /// Calculate directory size recursively
    fn dir_size(path: &Path) -> Result<u64> {
        let mut size = 0u64;

        if path.is_dir() {
            for entry in std::fs::read_dir(path).map_err(|e| LookbookError::Io {
                source: e,
                context: format!(
                    "Failed to read directory for size calculation: {}",
                    path.display()
                ),
            })? {
                let entry = entry.map_err(|e| LookbookError::Io {
                    source: e,
                    context: "Failed to read directory entry for size calculation".to_string(),
                })?;
                let path = entry.path();

                if path.is_dir() {
                    size += Self::dir_size(&path)?;
                } else {
                    size += entry
                        .metadata()
                        .map_err(|e| LookbookError::Io {
                            source: e,
                            context: format!("Failed to get file metadata: {}", path.display()),
                        })?
                        .len();
                }
            }
        }

        Ok(size)
    }
}

/// Combined storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub db: DbStats,
    pub store_size: u64,
}

impl StorageStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(storage.store_dir().exists());
        assert!(storage.db_path().exists());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(StorageStats::format_size(0), "0.00 B");
        assert_eq!(StorageStats::format_size(1023), "1023.00 B");
        assert_eq!(StorageStats::format_size(1024), "1.00 KB");
        assert_eq!(StorageStats::format_size(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_stats_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();
            storage.database.ensure_collection("text", 4).unwrap();
        }

        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.db.collections.len(), 1);
        assert!(stats.store_size > 0);
    }
}
