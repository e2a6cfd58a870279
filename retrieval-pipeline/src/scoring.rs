use serde::Serialize;

use common::storage::types::document_chunk::DocumentChunk;

/// Optional subscores from the two retrieval signals. Which ones are
/// set doubles as provenance: a chunk with a vector score came out of
/// the semantic search, with a keyword score out of the text search,
/// with both out of both.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Scores {
    pub keyword: Option<f32>,
    pub vector: Option<f32>,
}

/// A chunk paired with its accumulated retrieval scores.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
        }
    }

    pub const fn with_keyword_score(mut self, score: f32) -> Self {
        self.scores.keyword = Some(score);
        self
    }

    pub const fn with_vector_score(mut self, score: f32) -> Self {
        self.scores.vector = Some(score);
        self
    }
}

pub type RetrievedChunk = Scored<DocumentChunk>;

impl Scores {
    /// The score that ranks this entry inside its provenance bucket:
    /// the vector score when present, the keyword score otherwise.
    pub fn primary(&self) -> f32 {
        self.vector.or(self.keyword).unwrap_or(0.0)
    }
}

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Maps a KNN distance to a similarity in (0, 1].
pub fn distance_to_similarity(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    clamp_unit(1.0 / (1.0 + distance.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_zero_maps_to_one() {
        assert!((distance_to_similarity(0.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn larger_distance_maps_lower() {
        assert!(distance_to_similarity(1.0) > distance_to_similarity(4.0));
    }

    #[test]
    fn non_finite_and_negative_distances_are_tamed() {
        assert!((distance_to_similarity(f32::NAN)).abs() < f32::EPSILON);
        assert!((distance_to_similarity(-3.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn primary_prefers_vector() {
        let scores = Scores {
            keyword: Some(0.9),
            vector: Some(0.2),
        };
        assert!((scores.primary() - 0.2).abs() < f32::EPSILON);
    }
}
