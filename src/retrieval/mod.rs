//! Fusion search over the text and image indexes
//!
//! This module queries both modality indexes concurrently, joins candidates
//! by `product_id` under a weighted score, backfills text-only matches up to
//! a minimum result count, and optionally reranks with a lexical signal.

mod fusion;
mod hybrid;
mod lexical;

pub use fusion::{fuse, FusionConfig, FusionError, FusionWeights, Thresholds};
pub use hybrid::{FusionSearcher, SearchError};
pub use lexical::{lexical_score, LexicalReranker};

use crate::catalog::Metadata;
use serde::{Deserialize, Serialize};

/// Search request: one embedding per modality plus optional filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionQuery {
    /// Query embedding for the text index
    pub text_embedding: Vec<f32>,

    /// Query embedding for the image index
    pub image_embedding: Vec<f32>,

    /// Requested result count (raised to the configured floor)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum text similarity; falls back to the configured default
    #[serde(default)]
    pub text_threshold: Option<f32>,

    /// Minimum image similarity; falls back to the configured default
    #[serde(default)]
    pub image_threshold: Option<f32>,

    /// Category equality filter applied to both indexes
    #[serde(default)]
    pub category: Option<String>,

    /// Per-query weight override
    #[serde(default)]
    pub weights: Option<FusionWeights>,

    /// Free text for the lexical rerank stage
    #[serde(default)]
    pub query_text: Option<String>,
}

fn default_top_k() -> usize {
    10
}

impl FusionQuery {
    pub fn new(text_embedding: Vec<f32>, image_embedding: Vec<f32>, top_k: usize) -> Self {
        Self {
            text_embedding,
            image_embedding,
            top_k,
            text_threshold: None,
            image_threshold: None,
            category: None,
            weights: None,
            query_text: None,
        }
    }

    pub fn with_thresholds(mut self, text: f32, image: f32) -> Self {
        self.text_threshold = Some(text);
        self.image_threshold = Some(image);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_query_text(mut self, text: impl Into<String>) -> Self {
        self.query_text = Some(text.into());
        self
    }

    /// Query text with at least one term, if any
    pub fn rerank_text(&self) -> Option<&str> {
        self.query_text
            .as_deref()
            .filter(|text| text.split_whitespace().next().is_some())
    }
}

/// One ranked result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedMatch {
    pub product_id: String,
    pub category: String,
    pub metadata: Metadata,
    pub text_score: f32,
    /// Exactly 0.0 for text-only backfill entries
    pub image_score: f32,
    pub combined_score: f32,
}

impl FusedMatch {
    /// Backfilled from the text index alone, without image agreement
    pub fn is_text_only(&self) -> bool {
        self.image_score == 0.0
    }
}
