/// HNSW vector index for approximate cosine search
use super::flat::cosine_similarity;
use super::records::{RecordTable, Rows};
use super::{
    check_dimension, check_vector, squared_norm, IndexError, IndexHit, IndexRecord, VectorIndex,
    WriteHandle,
};
use crate::storage::Database;
use hnsw_rs::filter::FilterT;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Upper bound on graph layers (hnsw_rs caps this at 16)
const MAX_LAYERS: usize = 16;

/// Deleted points tolerated before a rebuild, whatever the collection size
const MIN_TOMBSTONES: usize = 32;

type Graph = Hnsw<'static, f32, DistCosine>;

/// HNSW construction and query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswParams {
    /// Vector dimension
    pub dimension: usize,
    /// Number of connections per layer
    pub m: usize,
    /// Construction beam width (higher = better recall, slower build)
    pub ef_construction: usize,
    /// Query beam width (higher = better recall, slower search)
    pub ef_search: usize,
    /// Expected collection size, used to size the graph
    pub max_elements: usize,
    /// Rebuild once deleted points exceed this share of live rows
    pub rebuild_ratio: f32,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            dimension: 768,
            m: 8,
            ef_construction: 64,
            ef_search: 250,
            max_elements: 100_000,
            rebuild_ratio: 0.5,
        }
    }
}

/// HNSW vector index wrapper
///
/// Deletes are tombstones: the graph keeps the point, the row table forgets
/// it, and every search filters against the row table. Once tombstones pass
/// `rebuild_ratio` of the live rows the graph is rebuilt from live rows, as it
/// is when a persisted collection is reopened.
///
/// Zero-norm embeddings stay in the row table but never enter the graph, and
/// score 0.0 against everything. Hits are rescored with exact cosine
/// similarity, so scores match [`FlatIndex`](super::FlatIndex).
///
/// Lock order is graph first, then the row table.
pub struct HnswIndex {
    graph: RwLock<Graph>,
    table: RecordTable,
    params: HnswParams,
    /// Points in the current graph, tombstones included
    points: AtomicUsize,
    /// Deleted rows since the graph was last built
    tombstones: AtomicUsize,
}

impl HnswIndex {
    /// Create an empty in-memory index
    pub fn new(name: impl Into<String>, params: HnswParams) -> Self {
        Self {
            graph: RwLock::new(Self::build_graph(&params)),
            table: RecordTable::in_memory(name),
            params,
            points: AtomicUsize::new(0),
            tombstones: AtomicUsize::new(0),
        }
    }

    /// Open an index over a persisted collection, rebuilding the graph
    pub fn open(
        name: impl Into<String>,
        params: HnswParams,
        database: Arc<Database>,
    ) -> Result<Self, IndexError> {
        let table = RecordTable::attached(name, params.dimension, database)?;
        let graph = Self::build_graph(&params);
        let points = Self::populate(&graph, &table, &params)?;

        tracing::debug!(
            "Rebuilt HNSW graph for '{}' with {} points",
            table.collection(),
            points
        );

        Ok(Self {
            graph: RwLock::new(graph),
            table,
            params,
            points: AtomicUsize::new(points),
            tombstones: AtomicUsize::new(0),
        })
    }

    fn build_graph(params: &HnswParams) -> Graph {
        Hnsw::<f32, DistCosine>::new(
            params.m,
            params.max_elements,
            MAX_LAYERS,
            params.ef_construction,
            DistCosine,
        )
    }

    /// Insert every live row with a usable embedding, returning the point count
    fn populate(
        graph: &Graph,
        table: &RecordTable,
        params: &HnswParams,
    ) -> Result<usize, IndexError> {
        let rows = table.read()?;
        let mut points = 0;
        for (row_id, record) in rows.iter() {
            check_dimension(params.dimension, &record.embedding)?;
            if let Err(e) = check_vector(params.dimension, &record.embedding) {
                tracing::warn!(
                    "Row {} of '{}' left out of the graph: {}",
                    row_id,
                    table.collection(),
                    e
                );
                continue;
            }
            if squared_norm(&record.embedding) > 0.0 {
                graph.insert((record.embedding.as_slice(), row_id as usize));
                points += 1;
            }
        }
        Ok(points)
    }

    /// Swap in a graph holding live rows only
    fn rebuild(&self) -> Result<(), IndexError> {
        let mut graph = self.graph.write().map_err(|_| self.poisoned())?;
        let fresh = Self::build_graph(&self.params);
        let points = Self::populate(&fresh, &self.table, &self.params)?;
        *graph = fresh;

        let before = self.points.swap(points, Ordering::SeqCst);
        self.tombstones.store(0, Ordering::SeqCst);

        tracing::debug!(
            "Rebuilt HNSW graph for '{}': {} points, {} dropped",
            self.table.collection(),
            points,
            before.saturating_sub(points)
        );
        Ok(())
    }

    fn rebuild_threshold(&self) -> usize {
        let live = self.table.len() as f32;
        ((live * self.params.rebuild_ratio) as usize).max(MIN_TOMBSTONES)
    }

    fn poisoned(&self) -> IndexError {
        IndexError::Unavailable(
            self.table.collection().to_string(),
            "graph lock poisoned".to_string(),
        )
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Points in the graph, deleted ones included
    pub fn graph_len(&self) -> usize {
        self.points.load(Ordering::SeqCst)
    }
}

fn hit(row_id: u64, record: &IndexRecord, score: f32) -> IndexHit {
    IndexHit {
        row_id,
        product_id: record.product_id.clone(),
        category: record.category.clone(),
        metadata: record.metadata.clone(),
        score,
    }
}

/// Live rows in row id order, all scored 0.0
fn unranked(rows: &Rows, category: Option<&str>) -> Vec<IndexHit> {
    rows.iter()
        .filter(|(_, record)| category.map_or(true, |c| record.category == c))
        .map(|(row_id, record)| hit(row_id, record, 0.0))
        .collect()
}

impl VectorIndex for HnswIndex {
    fn name(&self) -> &str {
        self.table.collection()
    }

    fn dimension(&self) -> usize {
        self.params.dimension
    }

    fn insert(&self, record: IndexRecord) -> Result<WriteHandle, IndexError> {
        check_vector(self.params.dimension, &record.embedding)?;

        let data = (squared_norm(&record.embedding) > 0.0).then(|| record.embedding.clone());

        // Held across both writes so clear and rebuild never split a row
        let graph = self.graph.read().map_err(|_| self.poisoned())?;
        let row_id = self.table.insert(record)?;
        if let Some(data) = data {
            graph.insert((data.as_slice(), row_id as usize));
            self.points.fetch_add(1, Ordering::SeqCst);
        }

        Ok(WriteHandle { row_id })
    }

    fn delete(&self, product_id: &str) -> Result<usize, IndexError> {
        let deleted = self.table.delete(product_id)?;
        if deleted == 0 {
            return Ok(0);
        }

        let tombstones = self.tombstones.fetch_add(deleted, Ordering::SeqCst) + deleted;
        if tombstones > self.rebuild_threshold() {
            // The rows are gone either way; a failed rebuild only keeps the tombstones
            if let Err(e) = self.rebuild() {
                tracing::warn!("Graph rebuild for '{}' failed: {}", self.name(), e);
            }
        }
        Ok(deleted)
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<IndexHit>, IndexError> {
        check_vector(self.params.dimension, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let graph = self.graph.read().map_err(|_| self.poisoned())?;
        let rows = self.table.read()?;

        // A zero query has no direction, so nothing outranks anything
        if squared_norm(query) == 0.0 {
            let mut hits = unranked(&rows, category);
            hits.sort_by_key(|hit| hit.row_id);
            hits.truncate(k);
            return Ok(hits);
        }

        let live = |id: &usize| rows.matches(*id as u64, category);
        let filter: &dyn FilterT = &live;
        let neighbours = graph.search_filter(query, k, self.params.ef_search.max(k), Some(filter));

        let mut hits: Vec<IndexHit> = neighbours
            .into_iter()
            .filter_map(|neighbour| {
                let row_id = neighbour.d_id as u64;
                rows.get(row_id).map(|record| {
                    hit(row_id, record, cosine_similarity(query, &record.embedding))
                })
            })
            .filter(|hit| category.map_or(true, |c| hit.category == c))
            .collect();

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
        let mut graph = self.graph.write().map_err(|_| self.poisoned())?;
        self.table.clear()?;
        *graph = Self::build_graph(&self.params);
        self.points.store(0, Ordering::SeqCst);
        self.tombstones.store(0, Ordering::SeqCst);
        Ok(())
    }
}
