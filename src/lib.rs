//! # shapeseek - price-shape similarity search
//!
//! Finds historical episodes whose price shape resembles a recent window,
//! re-ranks them with an elastic distance and hand-engineered shape features,
//! and labels what happened next with a triple-barrier scheme to estimate a
//! win rate.
//!
//! ## Quick Start
//!
//! ```rust
//! use shapeseek::prelude::*;
//! use chrono::NaiveDate;
//!
//! // A toy encoder: z-scored closes of the last 20 observations.
//! struct Closes;
//!
//! impl Encoder for Closes {
//!     fn encode(&self, window: &QueryWindow) -> Result<Vec<f32>> {
//!         let tail = window.tail_closes(20);
//!         Ok(shapeseek::metrics::z_normalize(&tail).unwrap_or_default()
//!             .into_iter().map(|v| v as f32).collect())
//!     }
//! }
//!
//! let engine = EngineBuilder::new()
//!     .encoder(Closes)
//!     .index(FlatIndex::new(20, ScoreMetric::InnerProduct))
//!     .catalog(InMemoryCatalog::new())
//!     .history(MemoryPriceHistory::new())
//!     .build()
//!     .unwrap();
//!
//! let status = engine.status();
//! assert_eq!(status.record_count, 0);
//!
//! // An empty index cannot serve searches.
//! let request = SearchRequest::new("AAPL").date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
//! assert!(engine.search(&request).is_err());
//! ```

pub mod catalog;
pub mod config;
pub mod filter;
pub mod history;
pub mod index;
pub mod labeler;
pub mod metrics;
pub mod pipeline;
pub mod rerank;
pub mod stats;

pub mod prelude {
    pub use crate::{
        // Reference collaborators
        catalog::{CatalogEntry, InMemoryCatalog},
        // Configuration
        config::{ParamKind, ParamMeta, SearchConfig},
        filter::{CandidateFilter, ResolvedCandidate},
        history::{MemoryPriceHistory, PriceHistory},
        index::FlatIndex,
        labeler::{BarrierOutcome, BarrierState, HitType, Label, TripleBarrier},
        // Pipeline
        pipeline::{
            EngineBuilder, EngineStatus, LabeledMatch, QueryInfo, SearchEngine, SearchRequest,
            SearchResponse, SearchResult,
        },
        rerank::{ScoredCandidate, TrendMatch},
        // Parallel
        search_parallel,
        stats::WinRateStats,
        CoarseHit,
        // Boundary traits
        Encoder,
        Lookback,
        MetadataCatalog,
        Period,
        PriceHistoryProvider,
        PricePoint,
        QueryWindow,
        Ratio,
        Result,
        ScoreMetric,
        // Errors
        SearchError,
        SearchFailure,
        SearchOutcome,
        VectorId,
        VectorIndex,
    };
}

use chrono::NaiveDate;

use crate::catalog::CatalogEntry;
use crate::pipeline::{SearchEngine, SearchRequest, SearchResult};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while serving a search
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Insufficient data for {what}: need {need}, got {got}")]
    InsufficientData {
        what: &'static str,
        need: usize,
        got: usize,
    },

    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("No catalog entry for vector {vector_id}")]
    ResolutionFailure { vector_id: VectorId },

    #[error("Price history unavailable for {symbol}: {reason}")]
    HistoryUnavailable { symbol: String, reason: String },

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid price at index {index}: {reason}")]
    InvalidPrice { index: usize, reason: &'static str },
}

impl SearchError {
    /// Stable tag for the failure envelope
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::InsufficientData { .. } => "insufficient_data",
            SearchError::ModelUnavailable(_) => "model_unavailable",
            SearchError::IndexUnavailable(_) => "index_unavailable",
            SearchError::ResolutionFailure { .. } => "resolution_failure",
            SearchError::HistoryUnavailable { .. } => "history_unavailable",
            SearchError::InvalidValue(_)
            | SearchError::OutOfRange { .. }
            | SearchError::InvalidConfig(_) => "invalid_config",
            SearchError::InvalidPrice { .. } => "invalid_price",
        }
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(SearchError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(SearchError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SearchError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PRICE DATA
// ============================================================

/// One daily close
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }

    /// Reject closes that would poison returns and normalization
    pub fn validate(&self) -> Result<()> {
        if self.close.is_nan() {
            return Err(SearchError::InvalidPrice {
                index: 0,
                reason: "NaN close",
            });
        }
        if self.close.is_infinite() {
            return Err(SearchError::InvalidPrice {
                index: 0,
                reason: "Infinite close",
            });
        }
        if self.close <= 0.0 {
            return Err(SearchError::InvalidPrice {
                index: 0,
                reason: "non-positive close",
            });
        }
        Ok(())
    }
}

/// How much history to ask a provider for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lookback {
    /// The most recent `n` observations
    Days(usize),
    /// Everything the provider has
    #[default]
    Max,
}

/// The recent window a search is run for
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueryWindow {
    pub symbol: String,
    pub points: Vec<PricePoint>,
}

impl QueryWindow {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// The last `n` closes (fewer if the window is shorter)
    pub fn tail_closes(&self, n: usize) -> Vec<f64> {
        let start = self.points.len().saturating_sub(n);
        self.points[start..].iter().map(|p| p.close).collect()
    }
}

// ============================================================
// INDEX PRIMITIVES
// ============================================================

/// Opaque identifier of an indexed embedding
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct VectorId(pub u64);

impl std::fmt::Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One result of the coarse retrieval stage, in the index's own order
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CoarseHit {
    pub raw_score: f64,
    pub vector_id: VectorId,
}

/// Metric space of an index's raw scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMetric {
    /// Higher is closer; scores in [-1, 1] for unit vectors
    #[default]
    InnerProduct,
    /// Lower is closer; non-negative
    L2Distance,
}

impl ScoreMetric {
    /// Monotonic map from a raw index score to a similarity in [0, 1]
    pub fn visual_similarity(self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return 0.0;
        }
        match self {
            ScoreMetric::InnerProduct => ((raw + 1.0) / 2.0).clamp(0.0, 1.0),
            ScoreMetric::L2Distance => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

// ============================================================
// COLLABORATOR TRAITS
// ============================================================

/// Turns a query window (rendered however the implementation likes) into an embedding
pub trait Encoder: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }

    fn encode(&self, window: &QueryWindow) -> Result<Vec<f32>>;
}

/// Approximate nearest-neighbour index over chart embeddings
pub trait VectorIndex: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn metric(&self) -> ScoreMetric;

    /// Up to `k` hits, most similar first
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<CoarseHit>>;

    /// Stored vector for an id, if the index keeps them
    fn vector(&self, _id: VectorId) -> Option<Vec<f32>> {
        None
    }
}

/// Read-only map from vector ids to the episode they were built from
pub trait MetadataCatalog: Send + Sync {
    fn resolve(&self, id: VectorId) -> Result<CatalogEntry>;

    /// Latest id for `symbol` dated on or before `date`
    fn nearest_on_or_before(&self, symbol: &str, date: NaiveDate) -> Option<VectorId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of daily closes, oldest first
pub trait PriceHistoryProvider: Send + Sync {
    fn get(&self, symbol: &str, lookback: Lookback) -> Result<Vec<PricePoint>>;
}

// ============================================================
// PARALLEL SEARCH
// ============================================================

use rayon::prelude::*;

/// Result of a single request in a batch
#[derive(Debug)]
pub struct SearchOutcome {
    pub request: SearchRequest,
    pub result: SearchResult,
}

/// Error from a single request in a batch
#[derive(Debug)]
pub struct SearchFailure {
    pub request: SearchRequest,
    pub error: SearchError,
}

/// Run independent requests on the rayon pool
pub fn search_parallel<I>(engine: &SearchEngine, requests: I) -> (Vec<SearchOutcome>, Vec<SearchFailure>)
where
    I: IntoParallelIterator<Item = SearchRequest>,
{
    let results: Vec<_> = requests
        .into_par_iter()
        .map(|request| match engine.search(&request) {
            Ok(result) => Ok(SearchOutcome { request, result }),
            Err(error) => Err(SearchFailure { request, error }),
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_price_point_validation() {
        assert!(PricePoint::new(day(1), 10.0).validate().is_ok());
        assert!(PricePoint::new(day(1), 0.0).validate().is_err());
        assert!(PricePoint::new(day(1), -3.0).validate().is_err());
        assert!(PricePoint::new(day(1), f64::NAN).validate().is_err());
        assert!(PricePoint::new(day(1), f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_visual_similarity_inner_product() {
        let m = ScoreMetric::InnerProduct;
        assert_eq!(m.visual_similarity(1.0), 1.0);
        assert_eq!(m.visual_similarity(-1.0), 0.0);
        assert_eq!(m.visual_similarity(0.0), 0.5);
        assert_eq!(m.visual_similarity(1.5), 1.0);
        assert_eq!(m.visual_similarity(f64::NAN), 0.0);
    }

    #[test]
    fn test_visual_similarity_distance() {
        let m = ScoreMetric::L2Distance;
        assert_eq!(m.visual_similarity(0.0), 1.0);
        assert_eq!(m.visual_similarity(1.0), 0.5);
        assert_eq!(m.visual_similarity(-2.0), 1.0);
        assert!(m.visual_similarity(3.0) < m.visual_similarity(2.0));
    }

    #[test]
    fn test_query_window_tail() {
        let window = QueryWindow {
            symbol: "AAPL".to_string(),
            points: (1..=5).map(|d| PricePoint::new(day(d), d as f64)).collect(),
        };
        assert_eq!(window.tail_closes(2), vec![4.0, 5.0]);
        assert_eq!(window.tail_closes(10).len(), 5);
        assert_eq!(window.start_date(), Some(day(1)));
        assert_eq!(window.end_date(), Some(day(5)));
    }

    #[test]
    fn test_error_kinds() {
        let err = SearchError::InsufficientData {
            what: "query window",
            need: 60,
            got: 10,
        };
        assert_eq!(err.kind(), "insufficient_data");
        assert_eq!(
            err.to_string(),
            "Insufficient data for query window: need 60, got 10"
        );
        assert_eq!(
            SearchError::ResolutionFailure {
                vector_id: VectorId(7)
            }
            .to_string(),
            "No catalog entry for vector #7"
        );
    }
}
