//! Fusion search against scripted indexes with fixed scores

use lookbook::catalog::{Metadata, Modality};
use lookbook::index::{IndexError, IndexHit, IndexRecord, VectorIndex, WriteHandle};
use lookbook::retrieval::{FusionConfig, FusionQuery, FusionSearcher, LexicalReranker, SearchError};
use std::sync::Arc;

/// Read-only index that answers every query with the same scored hits
struct ScriptedIndex {
    hits: Vec<IndexHit>,
    unavailable: bool,
}

impl ScriptedIndex {
    fn new(hits: &[(&str, &str, f32)]) -> Arc<Self> {
        let hits = hits
            .iter()
            .enumerate()
            .map(|(i, (id, category, score))| IndexHit {
                row_id: i as u64 + 1,
                product_id: id.to_string(),
                category: category.to_string(),
                metadata: Metadata::new(),
                score: *score,
            })
            .collect();
        Arc::new(Self {
            hits,
            unavailable: false,
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            hits: Vec::new(),
            unavailable: true,
        })
    }
}

impl VectorIndex for ScriptedIndex {
    fn name(&self) -> &str {
        "scripted"
    }

    fn dimension(&self) -> usize {
        2
    }

    fn insert(&self, _record: IndexRecord) -> Result<WriteHandle, IndexError> {
        Err(IndexError::Storage("read-only".to_string()))
    }

    fn delete(&self, _product_id: &str) -> Result<usize, IndexError> {
        Err(IndexError::Storage("read-only".to_string()))
    }

    fn search(
        &self,
        _query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<IndexHit>, IndexError> {
        if self.unavailable {
            return Err(IndexError::Unavailable(
                "scripted".to_string(),
                "connection refused".to_string(),
            ));
        }
        Ok(self
            .hits
            .iter()
            .filter(|hit| category.map_or(true, |c| hit.category == c))
            .take(k)
            .cloned()
            .collect())
    }

    fn count(&self, product_id: &str) -> Result<usize, IndexError> {
        Ok(self.hits.iter().filter(|h| h.product_id == product_id).count())
    }

    fn len(&self) -> usize {
        self.hits.len()
    }

    fn clear(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

fn searcher(text: Arc<ScriptedIndex>, image: Arc<ScriptedIndex>) -> FusionSearcher {
    FusionSearcher::new(text, image, FusionConfig::default(), LexicalReranker::default())
}

fn query(top_k: usize) -> FusionQuery {
    FusionQuery::new(vec![1.0, 0.0], vec![1.0, 0.0], top_k)
}

#[tokio::test]
async fn test_joined_entry_ranks_above_backfill() {
    let searcher = searcher(
        ScriptedIndex::new(&[("B", "dress", 0.95), ("A", "dress", 0.9)]),
        ScriptedIndex::new(&[("A", "dress", 0.8), ("B", "dress", 0.1)]),
    );

    let results = searcher
        .search(&query(1).with_thresholds(0.5, 0.3))
        .await
        .unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
    assert!((results[0].combined_score - 0.85).abs() < 1e-6);
    assert_eq!(results[1].image_score, 0.0);
    assert!((results[1].combined_score - 0.475).abs() < 1e-6);
}

#[tokio::test]
async fn test_floor_overrides_small_top_k() {
    let text: Vec<(String, f32)> = (0..10)
        .map(|i| (format!("p{i}"), 0.9 - i as f32 * 0.01))
        .collect();
    let hits: Vec<(&str, &str, f32)> = text
        .iter()
        .map(|(id, score)| (id.as_str(), "top", *score))
        .collect();
    let images: Vec<(&str, &str, f32)> = text
        .iter()
        .map(|(id, _)| (id.as_str(), "top", 0.6))
        .collect();

    let searcher = searcher(ScriptedIndex::new(&hits), ScriptedIndex::new(&images));

    let results = searcher.search(&query(2)).await.unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[0].product_id, "p0");

    let results = searcher.search(&query(8)).await.unwrap();
    assert_eq!(results.len(), 8);
}

#[tokio::test]
async fn test_short_list_when_inventory_is_thin() {
    let searcher = searcher(
        ScriptedIndex::new(&[("A", "dress", 0.9), ("B", "dress", 0.05)]),
        ScriptedIndex::new(&[("A", "dress", 0.9)]),
    );

    // B is under the default text threshold, so only A survives
    let results = searcher.search(&query(10)).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_category_filter_reaches_both_indexes() {
    let searcher = searcher(
        ScriptedIndex::new(&[("S", "shirt", 0.99), ("D", "dress", 0.8)]),
        ScriptedIndex::new(&[("S", "shirt", 0.99), ("D", "dress", 0.8)]),
    );

    let results = searcher
        .search(&query(5).with_category("dress"))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].product_id, "D");
}

#[tokio::test]
async fn test_unavailable_index_fails_the_search() {
    let searcher = searcher(
        ScriptedIndex::new(&[("A", "dress", 0.9)]),
        ScriptedIndex::down(),
    );

    match searcher.search(&query(5)).await {
        Err(SearchError::IndexUnavailable { modality, .. }) => {
            assert_eq!(modality, Modality::Image)
        }
        other => panic!("expected unavailable image index, got {:?}", other),
    }
}
