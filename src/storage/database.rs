//! SQLite database management with migrations
//!
//! Persists both modality collections: one `collections` row per index and
//! one `catalog_rows` row per inserted record (auto-assigned id, no
//! uniqueness on `product_id`, matching the index contract).

use crate::catalog::Metadata;
use crate::error::{LookbookError, Result};
use crate::index::IndexRecord;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LookbookError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| LookbookError::Config(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| LookbookError::Config(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Create a collection if missing; an existing collection must agree on dimension
    pub fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let conn = self.get_conn()?;

        let stored: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(stored) if stored as usize != dimension => Err(LookbookError::SchemaMismatch {
                name: name.to_string(),
                stored: stored as usize,
                configured: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
                    params![name, dimension as i64, chrono::Utc::now().to_rfc3339()],
                )?;
                tracing::info!("Created collection '{}' ({}D)", name, dimension);
                Ok(())
            }
        }
    }

    /// Insert one row and return its assigned id
    pub fn insert_row(&self, collection: &str, record: &IndexRecord) -> Result<u64> {
        let conn = self.get_conn()?;
        let metadata = serde_json::to_string(&record.metadata).map_err(|e| LookbookError::Json {
            source: e,
            context: format!("Failed to encode metadata for {}", record.product_id),
        })?;

        conn.execute(
            "INSERT INTO catalog_rows (collection, product_id, category, metadata, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                collection,
                record.product_id,
                record.category,
                metadata,
                encode_vector(&record.embedding),
                chrono::Utc::now().timestamp(),
            ],
        )?;

        Ok(conn.last_insert_rowid() as u64)
    }

    /// Delete every row of `product_id` in a collection
    pub fn delete_product(&self, collection: &str, product_id: &str) -> Result<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM catalog_rows WHERE collection = ?1 AND product_id = ?2",
            params![collection, product_id],
        )?;
        Ok(deleted)
    }

    /// Load every row of a collection
    pub fn load_rows(&self, collection: &str) -> Result<Vec<(u64, IndexRecord)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, product_id, category, metadata, embedding
             FROM catalog_rows WHERE collection = ?1 ORDER BY id",
        )?;

        let raw = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (id, product_id, category, metadata_json, blob) in raw {
            let metadata: Metadata =
                serde_json::from_str(&metadata_json).map_err(|e| LookbookError::Json {
                    source: e,
                    context: format!("Failed to decode metadata of row {}", id),
                })?;

            rows.push((
                id as u64,
                IndexRecord {
                    product_id,
                    embedding: decode_vector(&blob),
                    category,
                    metadata,
                },
            ));
        }

        Ok(rows)
    }

    /// Remove every row of a collection, keeping the collection itself
    pub fn clear_collection(&self, collection: &str) -> Result<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM catalog_rows WHERE collection = ?1",
            params![collection],
        )?;
        Ok(deleted)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.name, c.dimension, COUNT(r.id), COUNT(DISTINCT r.product_id)
             FROM collections c LEFT JOIN catalog_rows r ON r.collection = c.name
             GROUP BY c.name, c.dimension ORDER BY c.name",
        )?;

        let collections = stmt
            .query_map([], |row| {
                Ok(CollectionStats {
                    name: row.get(0)?,
                    dimension: row.get::<_, i64>(1)? as usize,
                    row_count: row.get::<_, i64>(2)? as usize,
                    product_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DbStats { collections })
    }

    /// Fold the WAL back into the main database file
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.get_conn()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}

/// Per-collection statistics
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub name: String,
    pub dimension: usize,
    pub row_count: usize,
    pub product_count: usize,
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub collections: Vec<CollectionStats>,
}

impl DbStats {
    pub fn collection(&self, name: &str) -> Option<&CollectionStats> {
        self.collections.iter().find(|c| c.name == name)
    }
}

/// Little-endian f32 encoding for embedding blobs
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE collections (
        name TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE catalog_rows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        product_id TEXT NOT NULL,
        category TEXT NOT NULL,
        metadata TEXT NOT NULL,  -- JSON metadata
        embedding BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
    );

    CREATE INDEX idx_rows_product ON catalog_rows(collection, product_id);
    CREATE INDEX idx_rows_category ON catalog_rows(collection, category);
    "#,
];
