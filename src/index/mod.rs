//! Per-modality vector indexes
//!
//! Each modality (text, image) lives in its own collection behind the
//! [`VectorIndex`] trait:
//! - insert a record (no uniqueness check, every insert gets a fresh row id)
//! - delete by exact `product_id`
//! - cosine top-N search with an optional `category` equality prefilter
//! - exact-match point lookups used by the ingestion dedup gate
//!
//! Two backends ship with the crate: [`HnswIndex`] (approximate, `hnsw_rs`)
//! and [`FlatIndex`] (exact brute force). Both can write through to the
//! SQLite [`Database`](crate::storage::Database) so a catalog survives restarts.

mod flat;
mod hnsw;
mod records;

pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};
pub use records::RecordTable;

use crate::catalog::Metadata;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index '{0}' is unavailable: {1}")]
    Unavailable(String, String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// One row of a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub product_id: String,
    pub embedding: Vec<f32>,
    pub category: String,
    pub metadata: Metadata,
}

/// Row id assigned by the index on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteHandle {
    pub row_id: u64,
}

/// Search result with row payload and cosine similarity score
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub row_id: u64,
    pub product_id: String,
    pub category: String,
    pub metadata: Metadata,
    /// Cosine similarity (roughly -1.0 to 1.0, higher is more similar)
    pub score: f32,
}

/// Vector index contract for one modality's collection
pub trait VectorIndex: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Configured vector dimension
    fn dimension(&self) -> usize;

    /// Insert a record under a fresh row id
    fn insert(&self, record: IndexRecord) -> Result<WriteHandle, IndexError>;

    /// Delete every row whose `product_id` matches exactly, returning the count
    fn delete(&self, product_id: &str) -> Result<usize, IndexError>;

    /// Top-`k` rows by cosine similarity, best first
    fn search(
        &self,
        query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<IndexHit>, IndexError>;

    /// Number of live rows for a `product_id`
    fn count(&self, product_id: &str) -> Result<usize, IndexError>;

    /// Whether any live row exists for a `product_id`
    fn exists(&self, product_id: &str) -> Result<bool, IndexError> {
        Ok(self.count(product_id)? > 0)
    }

    /// Number of live rows
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every row from the collection
    fn clear(&self) -> Result<(), IndexError>;
}

/// Dimension check shared by the backends
pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Dimension check plus magnitude check: every component finite and the
/// squared norm representable as an `f32`
pub(crate) fn check_vector(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    check_dimension(expected, vector)?;
    if let Some(position) = vector.iter().position(|x| !x.is_finite()) {
        return Err(IndexError::InvalidVector(format!(
            "component {} is {}",
            position, vector[position]
        )));
    }
    if !squared_norm(vector).is_finite() {
        return Err(IndexError::InvalidVector(
            "squared norm overflows f32".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn squared_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum()
}
