//! Similarity-threshold retrieval.

use crate::document::Document;
use crate::vector_index::VectorIndex;
use ragchart_core::{AppError, AppResult};
use std::sync::Arc;

/// Convert a normalized distance into a relevance percentage.
pub fn similarity_percent(distance: f64) -> f64 {
    (1.0 - distance) * 100.0
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Queries the vector index and keeps candidates above a relevance floor.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Return up to `k` documents whose similarity is at least `threshold`
    /// percent, each annotated with its rounded `similarity_score`.
    ///
    /// Candidate order from the index is preserved. No survivors is an empty
    /// result, not an error.
    pub async fn retrieve(&self, query: &str, k: usize, threshold: f64) -> AppResult<Vec<Document>> {
        if k == 0 {
            return Err(AppError::Config(
                "retrieval k must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&threshold) {
            return Err(AppError::Config(format!(
                "retrieval threshold must be within [0, 100], got {}",
                threshold
            )));
        }

        let candidates = self.index.search(query, k).await?;
        let requested = candidates.len();

        let results: Vec<Document> = candidates
            .into_iter()
            .filter_map(|candidate| {
                if !(0.0..=1.0).contains(&candidate.distance) {
                    tracing::debug!(
                        distance = candidate.distance,
                        "Index returned a distance outside [0, 1]"
                    );
                }

                let similarity = similarity_percent(candidate.distance);
                (similarity >= threshold)
                    .then(|| candidate.document.with_similarity_score(round2(similarity)))
            })
            .collect();

        tracing::debug!(
            candidates = requested,
            kept = results.len(),
            threshold,
            "Applied similarity threshold"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedIndex;

    fn retriever(candidates: &[(&str, f64)]) -> Retriever {
        Retriever::new(Arc::new(FixedIndex::texts(candidates)))
    }

    #[tokio::test]
    async fn test_keeps_candidates_above_threshold_in_order() {
        let r = retriever(&[("a", 0.1), ("b", 0.5), ("c", 0.85)]);
        let results = r.retrieve("q", 5, 20.0).await.unwrap();

        let contents: Vec<&str> = results.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
        assert_eq!(results[0].similarity_score(), Some(90.0));
        assert_eq!(results[1].similarity_score(), Some(50.0));
    }

    #[tokio::test]
    async fn test_scores_are_rounded_and_above_threshold() {
        let distances = [0.12345, 0.0, 0.333333, 0.7999, 0.42];
        let candidates: Vec<(&str, f64)> = distances.iter().map(|d| ("x", *d)).collect();
        let threshold = 20.0;

        let results = retriever(&candidates).retrieve("q", 5, threshold).await.unwrap();
        assert_eq!(results.len(), distances.len());
        for (doc, d) in results.iter().zip(distances) {
            let score = doc.similarity_score().unwrap();
            assert_eq!(score, round2((1.0 - d) * 100.0));
            assert!(score >= threshold);
        }
    }

    #[tokio::test]
    async fn test_threshold_100_drops_non_identical() {
        let r = retriever(&[("near", 0.001), ("far", 0.4)]);
        assert!(r.retrieve("q", 5, 100.0).await.unwrap().is_empty());

        let exact = retriever(&[("same", 0.0)]);
        assert_eq!(exact.retrieve("q", 5, 100.0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_equal_distances_keep_index_order() {
        let r = retriever(&[
            ("first", 0.3),
            ("dropped", 0.9),
            ("second", 0.3),
            ("third", 0.3),
            ("fourth", 0.1),
        ]);
        let results = r.retrieve("q", 5, 20.0).await.unwrap();

        let contents: Vec<&str> = results.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third", "fourth"]);
        assert_eq!(results[0].similarity_score(), results[2].similarity_score());
    }

    #[tokio::test]
    async fn test_no_survivors_is_empty_not_error() {
        let r = retriever(&[("a", 0.9), ("b", 0.95)]);
        assert!(r.retrieve("q", 5, 20.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_k_limits_candidates() {
        let r = retriever(&[("a", 0.1), ("b", 0.2), ("c", 0.3)]);
        assert_eq!(r.retrieve("q", 2, 0.0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let r = retriever(&[("a", 0.1)]);
        assert!(matches!(r.retrieve("q", 0, 20.0).await, Err(AppError::Config(_))));
        assert!(matches!(r.retrieve("q", 5, 120.0).await, Err(AppError::Config(_))));
        assert!(matches!(r.retrieve("q", 5, -1.0).await, Err(AppError::Config(_))));
    }
}
