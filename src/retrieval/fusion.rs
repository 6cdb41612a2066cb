//! Weighted cross-modal fusion with threshold filtering and floor backfill

use super::FusedMatch;
use crate::config::SearchConfig;
use crate::index::IndexHit;
use ahash::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be finite and non-negative (text={text}, image={image})")]
    InvalidWeights { text: f32, image: f32 },
}

/// Per-modality weights. The combined score is their literal weighted sum,
/// not a normalized average, so the weights need not add up to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub text: f32,
    pub image: f32,
}

impl FusionWeights {
    pub fn new(text: f32, image: f32) -> Result<Self, FusionError> {
        Self { text, image }.validated()
    }

    /// Re-check weights that arrived through deserialization
    pub fn validated(self) -> Result<Self, FusionError> {
        let ok = |w: f32| w.is_finite() && w >= 0.0;
        if !ok(self.text) || !ok(self.image) {
            return Err(FusionError::InvalidWeights {
                text: self.text,
                image: self.image,
            });
        }
        Ok(self)
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            text: 0.5,
            image: 0.5,
        }
    }
}

/// Minimum similarity a candidate needs to be admitted from each modality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub text: f32,
    pub image: f32,
}

/// Configuration for the fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub weights: FusionWeights,

    /// Default thresholds for plain fusion search
    pub thresholds: Thresholds,

    /// Default thresholds when the lexical rerank stage runs
    pub hybrid_thresholds: Thresholds,

    /// Result floor targeted whenever inventory allows
    pub min_results: usize,

    /// Raw candidates fetched per requested result
    pub oversample_factor: usize,

    /// Lower bound on raw candidates fetched per index
    pub min_candidates: usize,
}

impl FusionConfig {
    pub fn from_settings(settings: &SearchConfig) -> Result<Self, FusionError> {
        Ok(Self {
            weights: FusionWeights::new(settings.text_weight, settings.image_weight)?,
            thresholds: Thresholds {
                text: settings.text_threshold,
                image: settings.image_threshold,
            },
            hybrid_thresholds: Thresholds {
                text: settings.hybrid_text_threshold,
                image: settings.hybrid_image_threshold,
            },
            min_results: settings.min_results,
            oversample_factor: settings.oversample_factor,
            min_candidates: settings.min_candidates,
        })
    }

    /// Requested count raised to the floor
    pub fn effective_top_k(&self, top_k: usize) -> usize {
        top_k.max(self.min_results)
    }

    /// Raw candidate limit per index for an effective `top_k`
    pub fn candidate_limit(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.oversample_factor)
            .max(self.min_candidates)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            thresholds: Thresholds {
                text: 0.1,
                image: 0.1,
            },
            hybrid_thresholds: Thresholds {
                text: 0.7,
                image: 0.7,
            },
            min_results: 5,
            oversample_factor: 20,
            min_candidates: 200,
        }
    }
}

/// Fuse raw per-modality hits into one ranked list.
///
/// 1. Drop candidates below their modality's threshold.
/// 2. Map surviving image hits by `product_id` (last one wins on duplicates).
/// 3. Join every surviving text hit that has an image counterpart and score
///    it `w_text * text + w_image * image`.
/// 4. If fewer than `min_results` joined entries exist, backfill unseen
///    text-only hits in text-score order with `image_score = 0`.
/// 5. Sort by combined score and keep `max(top_k, min_results)`.
pub fn fuse(
    text_hits: Vec<IndexHit>,
    image_hits: Vec<IndexHit>,
    thresholds: Thresholds,
    weights: FusionWeights,
    top_k: usize,
    min_results: usize,
) -> Vec<FusedMatch> {
    let text: Vec<IndexHit> = text_hits
        .into_iter()
        .filter(|hit| hit.score >= thresholds.text)
        .collect();

    let image_by_id: HashMap<String, IndexHit> = image_hits
        .into_iter()
        .filter(|hit| hit.score >= thresholds.image)
        .map(|hit| (hit.product_id.clone(), hit))
        .collect();

    let mut results: Vec<FusedMatch> = text
        .iter()
        .filter_map(|t| {
            image_by_id.get(&t.product_id).map(|i| FusedMatch {
                product_id: t.product_id.clone(),
                category: t.category.clone(),
                metadata: t.metadata.clone(),
                text_score: t.score,
                image_score: i.score,
                combined_score: weights.text * t.score + weights.image * i.score,
            })
        })
        .collect();

    sort_by_combined(&mut results);

    if results.len() < min_results {
        let mut seen: HashSet<String> = results.iter().map(|r| r.product_id.clone()).collect();

        for t in &text {
            if results.len() >= min_results {
                break;
            }
            if seen.insert(t.product_id.clone()) {
                results.push(FusedMatch {
                    product_id: t.product_id.clone(),
                    category: t.category.clone(),
                    metadata: t.metadata.clone(),
                    text_score: t.score,
                    image_score: 0.0,
                    combined_score: weights.text * t.score,
                });
            }
        }

        // Backfill competes on score with joined entries
        sort_by_combined(&mut results);
    }

    results.truncate(top_k.max(min_results));
    results
}

/// Stable descending sort on the combined score
pub(crate) fn sort_by_combined(results: &mut [FusedMatch]) {
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
