//! Fine re-ranking of de-duplicated coarse hits
//!
//! Each candidate gets four similarities against the query:
//!
//! - **visual**: the index's raw score mapped to [0, 1]
//! - **dtw**: `max(0, 1 - windowed_dtw)` of the two compared sub-windows
//! - **correlation**: Pearson of the sub-windows, `(r + 1) / 2`
//! - **shape**: cosine of the 8-dim descriptors, `(cos + 1) / 2`
//!
//! [`combined_score`] blends them with the configured weights and a
//! trend-agreement bonus. It is a pure function of a [`ScoreComponents`] value
//! and [`ScoreWeights`], which is what makes parallel scoring safe to merge.

use rayon::prelude::*;
use tracing::debug;

use crate::catalog::CatalogEntry;
use crate::config::{ScoreWeights, SearchConfig};
use crate::filter::ResolvedCandidate;
use crate::history::PriceCache;
use crate::metrics::{dtw_similarity, extract_shape_features, pearson, unit_remap, ShapeFeatures};
use crate::{PriceHistoryProvider, ScoreMetric};

/// Multiplier on visual similarity when no price window could be built
pub const FALLBACK_VISUAL_FACTOR: f64 = 0.3;

/// Neutral similarity used when correlation or shape is undefined
pub const NEUTRAL_SIMILARITY: f64 = 0.5;

/// Candidates per early-exit target ("3 x top_k" strong matches)
pub const EARLY_EXIT_FACTOR: usize = 3;

// ============================================================
// SCORE TYPES
// ============================================================

/// Whether query and candidate move the same way over the compared window
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMatch {
    Aligned,
    Opposed,
    Undetermined,
}

impl TrendMatch {
    pub fn between(query: Option<&ShapeFeatures>, candidate: Option<&ShapeFeatures>) -> Self {
        match (query, candidate) {
            (Some(q), Some(c)) if q.trend_sign() == c.trend_sign() => TrendMatch::Aligned,
            (Some(_), Some(_)) => TrendMatch::Opposed,
            _ => TrendMatch::Undetermined,
        }
    }

    /// +1 aligned, -1 opposed, 0 undetermined
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            TrendMatch::Aligned => 1.0,
            TrendMatch::Opposed => -1.0,
            TrendMatch::Undetermined => 0.0,
        }
    }
}

/// Inputs of the composite score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreComponents {
    pub visual: f64,
    /// `None` when the candidate's price window is unavailable
    pub dtw: Option<f64>,
    pub correlation: Option<f64>,
    pub shape: Option<f64>,
    pub trend: TrendMatch,
}

/// Composite score of one candidate
///
/// Without an elastic distance only the visual signal is trusted, damped by
/// [`FALLBACK_VISUAL_FACTOR`]. Undefined correlation or shape similarity count
/// as [`NEUTRAL_SIMILARITY`].
pub fn combined_score(c: &ScoreComponents, w: &ScoreWeights) -> f64 {
    let Some(dtw) = c.dtw else {
        return c.visual * FALLBACK_VISUAL_FACTOR;
    };
    let correlation = c.correlation.unwrap_or(NEUTRAL_SIMILARITY);
    let shape = c.shape.unwrap_or(NEUTRAL_SIMILARITY);

    w.dtw * dtw
        + w.corr * correlation
        + w.shape * shape
        + w.visual * c.visual
        + w.trend_bonus * c.trend.sign()
}

/// A candidate with its similarities and composite score
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: ResolvedCandidate,
    pub visual_similarity: f64,
    pub dtw_similarity: Option<f64>,
    /// Pearson correlation remapped to [0, 1]
    pub correlation: Option<f64>,
    pub shape_similarity: Option<f64>,
    pub trend_match: TrendMatch,
    pub combined_score: f64,
}

impl ScoredCandidate {
    pub fn components(&self) -> ScoreComponents {
        ScoreComponents {
            visual: self.visual_similarity,
            dtw: self.dtw_similarity,
            correlation: self.correlation,
            shape: self.shape_similarity,
            trend: self.trend_match,
        }
    }

    #[inline]
    pub fn entry(&self) -> &CatalogEntry {
        &self.candidate.entry
    }
}

/// Descending score, then ascending coarse rank
pub fn sort_by_score(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then(a.candidate.coarse_rank.cmp(&b.candidate.coarse_rank))
    });
}

// ============================================================
// RERANKER
// ============================================================

/// Result of a re-ranking pass
#[derive(Debug, Clone)]
pub struct Reranked {
    /// Sorted best first
    pub scored: Vec<ScoredCandidate>,
    /// Candidates scored before the scan stopped
    pub scanned: usize,
    pub early_exit: bool,
}

/// Scores candidates against one query window
#[derive(Debug, Clone)]
pub struct Reranker<'a> {
    config: &'a SearchConfig,
    weights: ScoreWeights,
    metric: ScoreMetric,
    query_window: Vec<f64>,
    query_shape: Option<ShapeFeatures>,
}

impl<'a> Reranker<'a> {
    /// `query_window` is the tail of the query compared against candidates
    pub fn new(config: &'a SearchConfig, metric: ScoreMetric, query_window: Vec<f64>) -> Self {
        let query_shape = extract_shape_features(&query_window);
        Self {
            config,
            weights: config.weights(),
            metric,
            query_window,
            query_shape,
        }
    }

    /// Score one candidate; `window` is its compared sub-window, if available
    pub fn score(&self, candidate: ResolvedCandidate, window: Option<&[f64]>) -> ScoredCandidate {
        let visual = self.metric.visual_similarity(candidate.hit.raw_score);

        let (dtw, correlation, shape, trend) = match window {
            Some(w) => {
                let dtw = dtw_similarity(&self.query_window, w, self.config.dtw_window);
                let correlation = pearson(&self.query_window, w).map(unit_remap);
                let shape_features = extract_shape_features(w);
                let shape = match (&self.query_shape, &shape_features) {
                    (Some(q), Some(c)) => Some(q.similarity(c)),
                    _ => None,
                };
                let trend = TrendMatch::between(self.query_shape.as_ref(), shape_features.as_ref());
                (dtw, correlation, shape, trend)
            }
            None => (None, None, None, TrendMatch::Undetermined),
        };

        let components = ScoreComponents {
            visual,
            dtw,
            correlation,
            shape,
            trend,
        };

        ScoredCandidate {
            candidate,
            visual_similarity: visual,
            dtw_similarity: dtw,
            correlation,
            shape_similarity: shape,
            trend_match: trend,
            combined_score: combined_score(&components, &self.weights),
        }
    }

    /// Counts toward the early exit
    #[inline]
    pub fn is_high_quality(&self, scored: &ScoredCandidate) -> bool {
        scored
            .dtw_similarity
            .is_some_and(|d| d > self.config.hq_dtw_threshold.get())
    }

    /// The candidate's sub-window ending at its catalog date
    pub fn candidate_window(&self, cache: &PriceCache, entry: &CatalogEntry) -> Option<Vec<f64>> {
        let history = cache.get(&entry.symbol)?;
        let end = history.position_on_or_before(entry.date)?;
        history.closes_ending_at(end, self.config.compare_len.get())
    }

    /// Score `candidates` in order until `3 * top_k` high-quality matches
    /// are found, then sort
    ///
    /// Work is done in chunks: histories for a chunk are fetched through
    /// `cache` first, then the chunk is scored (on the rayon pool when
    /// `parallel` is set) and consumed in coarse order. The output is the
    /// same as a one-by-one scan.
    pub fn rerank(
        &self,
        candidates: &[ResolvedCandidate],
        cache: &mut PriceCache,
        provider: &dyn PriceHistoryProvider,
        top_k: usize,
    ) -> Reranked {
        let target = top_k.saturating_mul(EARLY_EXIT_FACTOR);
        let chunk_size = target.max(1);

        let mut scored = Vec::with_capacity(candidates.len().min(chunk_size.saturating_mul(4)));
        let mut high_quality = 0usize;
        let mut early_exit = false;

        'chunks: for chunk in candidates.chunks(chunk_size) {
            for c in chunk {
                cache.load(provider, &c.entry.symbol);
            }

            let loaded: &PriceCache = cache;
            let score_one = |c: &ResolvedCandidate| {
                let window = self.candidate_window(loaded, &c.entry);
                self.score(c.clone(), window.as_deref())
            };
            let chunk_scored: Vec<ScoredCandidate> = if self.config.parallel {
                chunk.par_iter().map(score_one).collect()
            } else {
                chunk.iter().map(score_one).collect()
            };

            for s in chunk_scored {
                if self.is_high_quality(&s) {
                    high_quality += 1;
                }
                scored.push(s);
                if target > 0 && high_quality >= target {
                    early_exit = true;
                    break 'chunks;
                }
            }
        }

        if early_exit {
            debug!(
                high_quality,
                scanned = scored.len(),
                total = candidates.len(),
                "early exit"
            );
        }

        let scanned = scored.len();
        sort_by_score(&mut scored);
        Reranked {
            scored,
            scanned,
            early_exit,
        }
    }
}
