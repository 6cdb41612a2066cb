//! Lexical rerank against stored product descriptions

use super::fusion::sort_by_combined;
use super::FusedMatch;
use crate::catalog::description_of;

/// Fraction of whitespace-separated query terms found in `description`.
///
/// Matching is case-insensitive substring containment. Terms are not
/// deduplicated, so a repeated term counts once per occurrence.
pub fn lexical_score(query: &str, description: &str) -> f32 {
    let query = query.to_lowercase();
    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.is_empty() {
        return 0.0;
    }

    let description = description.to_lowercase();
    let hits = terms
        .iter()
        .filter(|term| description.contains(**term))
        .count();

    hits as f32 / terms.len() as f32
}

/// Blends the fusion score with the lexical score and reorders
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    vector_weight: f32,
    lexical_weight: f32,
}

impl LexicalReranker {
    pub fn new(vector_weight: f32, lexical_weight: f32) -> Self {
        Self {
            vector_weight,
            lexical_weight,
        }
    }

    /// Rescore each result as `vector_weight * combined + lexical_weight * lexical`,
    /// re-sort and keep `limit`. A query without terms or an empty result
    /// list passes through untouched.
    pub fn rerank(&self, query: &str, mut results: Vec<FusedMatch>, limit: usize) -> Vec<FusedMatch> {
        if results.is_empty() || query.split_whitespace().next().is_none() {
            return results;
        }

        for result in &mut results {
            let lexical = lexical_score(query, description_of(&result.metadata));
            result.combined_score =
                self.vector_weight * result.combined_score + self.lexical_weight * lexical;
        }

        sort_by_combined(&mut results);
        results.truncate(limit);

        tracing::debug!("Lexical rerank kept {} results", results.len());
        results
    }
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self::new(0.8, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MetaValue, Metadata, DESCRIPTION_KEY};

    fn result(product_id: &str, combined: f32, description: &str) -> FusedMatch {
        let mut metadata = Metadata::new();
        metadata.insert(DESCRIPTION_KEY.to_string(), MetaValue::from(description));
        FusedMatch {
            product_id: product_id.to_string(),
            category: "dress".to_string(),
            metadata,
            text_score: combined,
            image_score: combined,
            combined_score: combined,
        }
    }

    #[test]
    fn test_lexical_score() {
        assert_eq!(lexical_score("red silk", "A Red Silk slip dress"), 1.0);
        assert_eq!(lexical_score("red wool", "a red silk slip dress"), 0.5);
        assert_eq!(lexical_score("green", "a red silk slip dress"), 0.0);
        assert_eq!(lexical_score("", "anything"), 0.0);
    }

    #[test]
    fn test_repeated_terms_count_per_occurrence() {
        // "red red wool": two hits out of three terms
        let score = lexical_score("red red wool", "red dress");
        assert!((score - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_substring_match() {
        assert_eq!(lexical_score("flor", "floral midi"), 1.0);
    }

    #[test]
    fn test_rerank_extremes() {
        let reranker = LexicalReranker::default();
        let results = vec![
            result("all", 0.5, "black leather jacket"),
            result("none", 0.5, "white cotton tee"),
        ];

        let reranked = reranker.rerank("black leather", results, 5);
        assert_eq!(reranked[0].product_id, "all");
        assert!((reranked[0].combined_score - (0.8 * 0.5 + 0.2)).abs() < 1e-6);
        assert_eq!(reranked[1].combined_score, 0.8 * 0.5);
    }

    #[test]
    fn test_rerank_reorders_and_trims() {
        let reranker = LexicalReranker::default();
        let results = vec![
            result("a", 0.60, "plain shirt"),
            result("b", 0.55, "striped linen shirt"),
            result("c", 0.10, "boots"),
        ];

        let reranked = reranker.rerank("striped linen", results, 2);
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].product_id, "b");
        assert_eq!(reranked[1].product_id, "a");
    }

    #[test]
    fn test_rerank_noop_on_empty_query() {
        let reranker = LexicalReranker::default();
        let results = vec![result("a", 0.6, "plain shirt")];

        let reranked = reranker.rerank("   ", results.clone(), 5);
        assert_eq!(reranked, results);
        assert!(reranker.rerank("shirt", Vec::new(), 5).is_empty());
    }
}
