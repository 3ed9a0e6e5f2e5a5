//! Search orchestration
//!
//! ```text
//! query window -> embed -> coarse top-N -> CandidateFilter -> Reranker
//!              -> top-K -> TripleBarrier per match -> WinRateStats
//! ```
//!
//! A [`SearchEngine`] owns its collaborators and is immutable after
//! [`EngineBuilder::build`], so one engine can serve concurrent requests from
//! behind an `Arc`. Everything mutable lives in a [`RequestContext`] created at
//! the start of a request and dropped at its end.

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::filter::CandidateFilter;
use crate::history::{PriceCache, PriceHistory};
use crate::labeler::{BarrierOutcome, TripleBarrier};
use crate::rerank::{Reranker, ScoredCandidate};
use crate::stats::WinRateStats;
use crate::{
    Encoder, Lookback, MetadataCatalog, PriceHistoryProvider, QueryWindow, Result, SearchError,
    VectorIndex,
};

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_LOOKBACK: usize = 60;

// ============================================================
// REQUEST / RESPONSE TYPES
// ============================================================

/// Parameters of one search
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SearchRequest {
    pub symbol: String,
    /// Reference date; the latest available observation when absent
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Query window length in observations
    #[serde(default = "default_lookback")]
    pub lookback: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_lookback() -> usize {
    DEFAULT_LOOKBACK
}

impl SearchRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            date: None,
            top_k: DEFAULT_TOP_K,
            lookback: DEFAULT_LOOKBACK,
        }
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }
}

/// What the search actually ran on
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueryInfo {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub length: usize,
    pub last_close: f64,
}

/// A ranked match and, when its forward window exists, its outcome
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LabeledMatch {
    #[serde(flatten)]
    pub scored: ScoredCandidate,
    pub outcome: Option<BarrierOutcome>,
}

/// Top matches, best first, with their summary statistics
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SearchResult {
    pub query: QueryInfo,
    pub matches: Vec<LabeledMatch>,
    pub stats: WinRateStats,
    /// Candidates re-ranked before the scan stopped
    pub scanned: usize,
    pub early_exit: bool,
}

/// Tagged envelope for callers that speak JSON
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchResponse {
    Success {
        matches: Vec<LabeledMatch>,
        query_info: QueryInfo,
        win_rate_stats: WinRateStats,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl From<Result<SearchResult>> for SearchResponse {
    fn from(result: Result<SearchResult>) -> Self {
        match result {
            Ok(r) => SearchResponse::Success {
                matches: r.matches,
                query_info: r.query,
                win_rate_stats: r.stats,
            },
            Err(e) => SearchResponse::Error {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Readiness snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct EngineStatus {
    pub index_ready: bool,
    pub model_loaded: bool,
    pub record_count: usize,
}

// ============================================================
// REQUEST CONTEXT
// ============================================================

/// Mutable state of a single request; never shared between requests
#[derive(Debug)]
pub struct RequestContext {
    pub filter: CandidateFilter,
    pub prices: PriceCache,
}

impl RequestContext {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            filter: CandidateFilter::new(config.isolation_days),
            prices: PriceCache::new(),
        }
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Owned search service: encoder, index, catalog and price source
pub struct SearchEngine {
    encoder: Option<Box<dyn Encoder>>,
    index: Box<dyn VectorIndex>,
    catalog: Box<dyn MetadataCatalog>,
    history: Box<dyn PriceHistoryProvider>,
    config: SearchConfig,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("status", &self.status())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            index_ready: self.index.is_ready() && !self.index.is_empty(),
            model_loaded: self.encoder.as_ref().is_some_and(|e| e.is_ready()),
            record_count: self.index.len(),
        }
    }

    /// Search with the engine's own configuration
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.search_with(request, &self.config)
    }

    /// Search with a per-request configuration
    #[tracing::instrument(
        skip(self, config),
        fields(symbol = %request.symbol, top_k = request.top_k, lookback = request.lookback)
    )]
    pub fn search_with(&self, request: &SearchRequest, config: &SearchConfig) -> Result<SearchResult> {
        config.validate()?;
        if request.top_k == 0 {
            return Err(SearchError::InvalidValue("top_k must be > 0"));
        }
        if !self.index.is_ready() || self.index.is_empty() {
            return Err(SearchError::IndexUnavailable(format!(
                "index not ready ({} records)",
                self.index.len()
            )));
        }

        let mut ctx = RequestContext::new(config);
        let query = self.query_window(&mut ctx, request, config)?;
        let info = query_info(&query)?;

        let embedding = self.embed(&query)?;
        let hits = self.index.search(&embedding, config.coarse_k(request.top_k))?;
        debug!(hits = hits.len(), "coarse retrieval");

        // Episodes overlapping the query window are not analogues
        ctx.filter.reserve(&info.symbol, info.start_date, info.end_date);
        let candidates = ctx.filter.filter_hits(&hits, self.catalog.as_ref());

        let reranker = Reranker::new(
            config,
            self.index.metric(),
            query.tail_closes(config.compare_len.get()),
        );
        let reranked = reranker.rerank(
            &candidates,
            &mut ctx.prices,
            self.history.as_ref(),
            request.top_k,
        );

        let mut top = reranked.scored;
        top.truncate(request.top_k);
        let matches = label_matches(top, &ctx.prices, config);

        let stats = WinRateStats::from_outcomes(matches.iter().filter_map(|m| m.outcome.as_ref()));
        info!(
            matches = matches.len(),
            labeled = stats.total,
            scanned = reranked.scanned,
            win_rate = stats.win_rate,
            "search finished"
        );

        Ok(SearchResult {
            query: info,
            matches,
            stats,
            scanned: reranked.scanned,
            early_exit: reranked.early_exit,
        })
    }

    /// Load the query symbol's history and cut the query window from it
    ///
    /// The loaded history is kept in the request cache, so candidates of the
    /// same symbol do not fetch it again.
    fn query_window(
        &self,
        ctx: &mut RequestContext,
        request: &SearchRequest,
        config: &SearchConfig,
    ) -> Result<QueryWindow> {
        let compare_len = config.compare_len.get();
        if request.lookback < compare_len {
            return Err(SearchError::InsufficientData {
                what: "query window",
                need: compare_len,
                got: request.lookback,
            });
        }
        let need = request.lookback;
        let points = self.history.get(&request.symbol, Lookback::Max)?;
        let history = PriceHistory::new(points)?;

        let end = match request.date {
            Some(date) => history.position_on_or_before(date),
            None => history.len().checked_sub(1),
        };
        let available = end.map_or(0, |e| e + 1);
        let window = end
            .and_then(|e| history.window_ending_at(e, need))
            .ok_or(SearchError::InsufficientData {
                what: "query window",
                need,
                got: available,
            })?
            .to_vec();

        ctx.prices.insert(&request.symbol, history);
        Ok(QueryWindow {
            symbol: request.symbol.clone(),
            points: window,
        })
    }

    /// Encode the query, or fall back to the stored embedding of the same
    /// symbol when the encoder is not loaded
    fn embed(&self, query: &QueryWindow) -> Result<Vec<f32>> {
        if let Some(encoder) = self.encoder.as_ref().filter(|e| e.is_ready()) {
            return encoder.encode(query);
        }

        let stored = query.end_date().and_then(|end| {
            let id = self.catalog.nearest_on_or_before(&query.symbol, end)?;
            debug!(vector_id = %id, "encoder not loaded, using indexed embedding");
            self.index.vector(id)
        });
        stored.ok_or_else(|| {
            SearchError::ModelUnavailable(format!(
                "encoder not loaded and no indexed embedding for {}",
                query.symbol
            ))
        })
    }
}

fn query_info(query: &QueryWindow) -> Result<QueryInfo> {
    match (query.points.first(), query.points.last()) {
        (Some(first), Some(last)) => Ok(QueryInfo {
            symbol: query.symbol.clone(),
            start_date: first.date,
            end_date: last.date,
            length: query.len(),
            last_close: last.close,
        }),
        _ => Err(SearchError::InsufficientData {
            what: "query window",
            need: 1,
            got: 0,
        }),
    }
}

/// Attach barrier outcomes; matches without forward data keep `None`
fn label_matches(top: Vec<ScoredCandidate>, prices: &PriceCache, config: &SearchConfig) -> Vec<LabeledMatch> {
    let barrier = TripleBarrier::from_config(config);
    let label_one = |scored: ScoredCandidate| {
        let entry = scored.entry();
        let outcome = prices
            .get(&entry.symbol)
            .and_then(|history| barrier.label_at(history, entry.date));
        if outcome.is_none() {
            debug!(symbol = %entry.symbol, date = %entry.date, "no forward window, not labeled");
        }
        LabeledMatch { scored, outcome }
    };

    if config.parallel {
        top.into_par_iter().map(label_one).collect()
    } else {
        top.into_iter().map(label_one).collect()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`SearchEngine`]
#[derive(Default)]
pub struct EngineBuilder {
    encoder: Option<Box<dyn Encoder>>,
    index: Option<Box<dyn VectorIndex>>,
    catalog: Option<Box<dyn MetadataCatalog>>,
    history: Option<Box<dyn PriceHistoryProvider>>,
    config: SearchConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optional: without an encoder, queries use indexed embeddings
    pub fn encoder<E: Encoder + 'static>(mut self, encoder: E) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    pub fn index<I: VectorIndex + 'static>(mut self, index: I) -> Self {
        self.index = Some(Box::new(index));
        self
    }

    pub fn catalog<M: MetadataCatalog + 'static>(mut self, catalog: M) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    pub fn history<P: PriceHistoryProvider + 'static>(mut self, history: P) -> Self {
        self.history = Some(Box::new(history));
        self
    }

    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and assemble the engine
    pub fn build(self) -> Result<SearchEngine> {
        self.config.validate()?;
        let missing = |what: &str| SearchError::InvalidConfig(format!("{what} is required"));

        Ok(SearchEngine {
            encoder: self.encoder,
            index: self.index.ok_or_else(|| missing("vector index"))?,
            catalog: self.catalog.ok_or_else(|| missing("metadata catalog"))?,
            history: self.history.ok_or_else(|| missing("price history provider"))?,
            config: self.config,
        })
    }
}
