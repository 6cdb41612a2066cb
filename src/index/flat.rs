/// Exact brute-force cosine index
use super::records::RecordTable;
use super::{check_vector, IndexError, IndexHit, IndexRecord, VectorIndex, WriteHandle};
use crate::storage::Database;
use std::sync::Arc;

/// Scans every live row on each query. Exact, so it is the backend of choice
/// for small catalogs and for tests that need precise scores.
pub struct FlatIndex {
    table: RecordTable,
    dimension: usize,
}

impl FlatIndex {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            table: RecordTable::in_memory(name),
            dimension,
        }
    }

    /// Open a flat index over a persisted collection
    pub fn open(
        name: impl Into<String>,
        dimension: usize,
        database: Arc<Database>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            table: RecordTable::attached(name, dimension, database)?,
            dimension,
        })
    }
}

impl VectorIndex for FlatIndex {
    fn name(&self) -> &str {
        self.table.collection()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn insert(&self, record: IndexRecord) -> Result<WriteHandle, IndexError> {
        check_vector(self.dimension, &record.embedding)?;
        let row_id = self.table.insert(record)?;
        Ok(WriteHandle { row_id })
    }

    fn delete(&self, product_id: &str) -> Result<usize, IndexError> {
        self.table.delete(product_id)
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<IndexHit>, IndexError> {
        check_vector(self.dimension, query)?;

        let rows = self.table.read()?;
        let mut hits: Vec<IndexHit> = rows
            .iter()
            .filter(|(_, record)| category.map_or(true, |c| record.category == c))
            .map(|(row_id, record)| IndexHit {
                row_id,
                product_id: record.product_id.clone(),
                category: record.category.clone(),
                metadata: record.metadata.clone(),
                score: cosine_similarity(query, &record.embedding),
            })
            .collect();

        // Ties broken by row id so results are stable across runs
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.row_id.cmp(&b.row_id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    fn count(&self, product_id: &str) -> Result<usize, IndexError> {
        self.table.count(product_id)
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn clear(&self) -> Result<(), IndexError> {
        self.table.clear()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; zero vectors score 0.0
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na = dot(a, a).sqrt();
    let nb = dot(b, b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}
