//! Fusion searcher running both modality searches concurrently

use crate::catalog::{DualStore, Modality};
use crate::index::{check_vector, IndexError, IndexHit, VectorIndex};
use crate::retrieval::{
    fuse, FusedMatch, FusionConfig, FusionError, FusionQuery, LexicalReranker, Thresholds,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("{modality} index search failed: {source}")]
    IndexUnavailable {
        modality: Modality,
        #[source]
        source: IndexError,
    },

    #[error("{modality} query vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch {
        modality: Modality,
        expected: usize,
        actual: usize,
    },

    #[error("{modality} query vector rejected: {source}")]
    InvalidEmbedding {
        modality: Modality,
        #[source]
        source: IndexError,
    },

    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error("Search task failed: {0}")]
    TaskFailed(String),
}

/// Searcher over a text index and an image index
pub struct FusionSearcher {
    text_index: Arc<dyn VectorIndex>,
    image_index: Arc<dyn VectorIndex>,
    config: FusionConfig,
    reranker: LexicalReranker,
}

impl FusionSearcher {
    pub fn new(
        text_index: Arc<dyn VectorIndex>,
        image_index: Arc<dyn VectorIndex>,
        config: FusionConfig,
        reranker: LexicalReranker,
    ) -> Self {
        Self {
            text_index,
            image_index,
            config,
            reranker,
        }
    }

    /// Searcher reading the same indexes a store writes to
    pub fn for_store(store: &DualStore, config: FusionConfig, reranker: LexicalReranker) -> Self {
        Self::new(
            Arc::clone(store.index(Modality::Text)),
            Arc::clone(store.index(Modality::Image)),
            config,
            reranker,
        )
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    fn index(&self, modality: Modality) -> &Arc<dyn VectorIndex> {
        match modality {
            Modality::Text => &self.text_index,
            Modality::Image => &self.image_index,
        }
    }

    /// Perform fusion search, with the lexical rerank stage when the query
    /// carries text.
    ///
    /// Empty or fully below-threshold candidate sets are not errors: they
    /// resolve to a short (possibly empty) list.
    pub async fn search(&self, query: &FusionQuery) -> Result<Vec<FusedMatch>, SearchError> {
        self.check_query(Modality::Text, &query.text_embedding)?;
        self.check_query(Modality::Image, &query.image_embedding)?;

        let rerank_text = query.rerank_text();
        let defaults = if rerank_text.is_some() {
            self.config.hybrid_thresholds
        } else {
            self.config.thresholds
        };
        let thresholds = Thresholds {
            text: query.text_threshold.unwrap_or(defaults.text),
            image: query.image_threshold.unwrap_or(defaults.image),
        };

        let weights = match query.weights {
            Some(weights) => weights.validated()?,
            None => self.config.weights,
        };

        let top_k = self.config.effective_top_k(query.top_k);
        let limit = self.config.candidate_limit(top_k);

        // Step 1: Parallel text + image search
        let (text_hits, image_hits) = tokio::join!(
            self.search_index(
                Modality::Text,
                query.text_embedding.clone(),
                limit,
                query.category.clone()
            ),
            self.search_index(
                Modality::Image,
                query.image_embedding.clone(),
                limit,
                query.category.clone()
            )
        );
        let text_hits = text_hits?;
        let image_hits = image_hits?;

        tracing::debug!(
            "Raw candidates: {} text, {} image (limit {})",
            text_hits.len(),
            image_hits.len(),
            limit
        );

        // Step 2: Threshold, join, backfill
        let fused = fuse(
            text_hits,
            image_hits,
            thresholds,
            weights,
            top_k,
            self.config.min_results,
        );

        // Step 3: Lexical rerank if requested
        let results = match rerank_text {
            Some(text) => self.reranker.rerank(text, fused, top_k),
            None => fused,
        };

        Ok(results)
    }

    fn check_query(&self, modality: Modality, vector: &[f32]) -> Result<(), SearchError> {
        let expected = self.index(modality).dimension();
        if vector.len() != expected {
            return Err(SearchError::DimensionMismatch {
                modality,
                expected,
                actual: vector.len(),
            });
        }
        check_vector(expected, vector)
            .map_err(|source| SearchError::InvalidEmbedding { modality, source })
    }

    /// One index search on the blocking pool
    async fn search_index(
        &self,
        modality: Modality,
        vector: Vec<f32>,
        limit: usize,
        category: Option<String>,
    ) -> Result<Vec<IndexHit>, SearchError> {
        let index = Arc::clone(self.index(modality));

        tokio::task::spawn_blocking(move || index.search(&vector, limit, category.as_deref()))
            .await
            .map_err(|e| SearchError::TaskFailed(e.to_string()))?
            .map_err(|source| SearchError::IndexUnavailable { modality, source })
    }
}
