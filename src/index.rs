//! Brute-force reference index
//!
//! [`FlatIndex`] scans every stored vector, so its results are exact. It
//! stands in for a native ANN library in tests and benchmarks and for small
//! corpora where an approximate structure is not worth building.

use std::collections::HashMap;

use crate::{CoarseHit, Result, ScoreMetric, SearchError, VectorId, VectorIndex};

/// Exact index over fixed-dimension `f32` vectors
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    metric: ScoreMetric,
    ids: Vec<VectorId>,
    vectors: Vec<Vec<f32>>,
    positions: HashMap<VectorId, usize>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: ScoreMetric) -> Self {
        Self {
            dim,
            metric,
            ids: Vec::new(),
            vectors: Vec::new(),
            positions: HashMap::new(),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Store a vector. Ids must be unique.
    pub fn add(&mut self, id: VectorId, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(SearchError::InvalidValue("vector dimension does not match index"));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(SearchError::InvalidValue("vector contains NaN or infinite values"));
        }
        if self.positions.contains_key(&id) {
            return Err(SearchError::InvalidValue("duplicate vector id"));
        }

        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
        self.vectors.push(vector);
        Ok(())
    }

    fn raw_score(&self, query: &[f32], stored: &[f32]) -> f64 {
        match self.metric {
            ScoreMetric::InnerProduct => query
                .iter()
                .zip(stored)
                .map(|(a, b)| *a as f64 * *b as f64)
                .sum(),
            // Squared L2, the convention of most ANN libraries
            ScoreMetric::L2Distance => query
                .iter()
                .zip(stored)
                .map(|(a, b)| {
                    let d = *a as f64 - *b as f64;
                    d * d
                })
                .sum(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn metric(&self) -> ScoreMetric {
        self.metric
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<CoarseHit>> {
        if query.len() != self.dim {
            return Err(SearchError::InvalidValue("query dimension does not match index"));
        }

        let mut scored: Vec<CoarseHit> = self
            .ids
            .iter()
            .zip(&self.vectors)
            .map(|(&vector_id, v)| CoarseHit {
                raw_score: self.raw_score(query, v),
                vector_id,
            })
            .collect();

        // Stable: equal scores keep insertion order
        match self.metric {
            ScoreMetric::InnerProduct => {
                scored.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score))
            }
            ScoreMetric::L2Distance => scored.sort_by(|a, b| a.raw_score.total_cmp(&b.raw_score)),
        }
        scored.truncate(k);
        Ok(scored)
    }

    fn vector(&self, id: VectorId) -> Option<Vec<f32>> {
        self.positions.get(&id).map(|&i| self.vectors[i].clone())
    }
}
