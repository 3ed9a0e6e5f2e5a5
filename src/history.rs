//! Price histories and the request-scoped history cache

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::{Lookback, PriceHistoryProvider, PricePoint, Result, SearchError};

/// Validated daily closes, strictly increasing by date
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    points: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for (i, p) in points.iter().enumerate() {
            p.validate().map_err(|e| match e {
                SearchError::InvalidPrice { reason, .. } => {
                    SearchError::InvalidPrice { index: i, reason }
                }
                other => other,
            })?;
        }
        if points.windows(2).any(|w| w[1].date <= w[0].date) {
            return Err(SearchError::InvalidValue(
                "price history dates must be strictly increasing",
            ));
        }
        Ok(Self { points })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Index of the last observation dated on or before `date`
    pub fn position_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        self.points
            .partition_point(|p| p.date <= date)
            .checked_sub(1)
    }

    /// The `len` observations ending at (and including) `end`
    pub fn window_ending_at(&self, end: usize, len: usize) -> Option<&[PricePoint]> {
        if end >= self.points.len() || len == 0 || end + 1 < len {
            return None;
        }
        Some(&self.points[end + 1 - len..=end])
    }

    /// Closes of [`window_ending_at`](Self::window_ending_at)
    pub fn closes_ending_at(&self, end: usize, len: usize) -> Option<Vec<f64>> {
        self.window_ending_at(end, len)
            .map(|w| w.iter().map(|p| p.close).collect())
    }

    /// Entry close at `start` followed by the next `horizon` closes
    pub fn forward_closes(&self, start: usize, horizon: usize) -> Option<Vec<f64>> {
        let end = start.checked_add(horizon)?;
        if end >= self.points.len() {
            return None;
        }
        Some(self.points[start..=end].iter().map(|p| p.close).collect())
    }
}

// ============================================================
// IN-MEMORY PROVIDER
// ============================================================

/// Reference [`PriceHistoryProvider`] backed by a symbol map
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceHistory {
    series: HashMap<String, PriceHistory>,
}

impl MemoryPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a symbol's series after validating it
    pub fn insert(&mut self, symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<()> {
        self.series.insert(symbol.into(), PriceHistory::new(points)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl PriceHistoryProvider for MemoryPriceHistory {
    fn get(&self, symbol: &str, lookback: Lookback) -> Result<Vec<PricePoint>> {
        let history = self
            .series
            .get(symbol)
            .ok_or_else(|| SearchError::HistoryUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            })?;
        let points = history.points();
        let start = match lookback {
            Lookback::Days(n) => points.len().saturating_sub(n),
            Lookback::Max => 0,
        };
        Ok(points[start..].to_vec())
    }
}

// ============================================================
// REQUEST CACHE
// ============================================================

/// Memoizes one provider fetch per symbol for the lifetime of a request
///
/// Failed fetches are remembered too, so a symbol that cannot be loaded is
/// asked for once.
#[derive(Debug, Default)]
pub struct PriceCache {
    entries: HashMap<String, Option<PriceHistory>>,
    fetches: usize,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `symbol` through `provider` unless it was already attempted
    pub fn load(&mut self, provider: &dyn PriceHistoryProvider, symbol: &str) -> Option<&PriceHistory> {
        if !self.entries.contains_key(symbol) {
            self.fetches += 1;
            let loaded = provider
                .get(symbol, Lookback::Max)
                .and_then(PriceHistory::new);
            let entry = match loaded {
                Ok(history) => {
                    debug!(symbol, points = history.len(), "loaded price history");
                    Some(history)
                }
                Err(error) => {
                    warn!(symbol, %error, "price history unavailable");
                    None
                }
            };
            self.entries.insert(symbol.to_string(), entry);
        }
        self.get(symbol)
    }

    /// Seed the cache with a history fetched elsewhere
    pub fn insert(&mut self, symbol: &str, history: PriceHistory) {
        self.entries.insert(symbol.to_string(), Some(history));
    }

    /// Previously loaded history, without fetching
    pub fn get(&self, symbol: &str) -> Option<&PriceHistory> {
        self.entries.get(symbol).and_then(Option::as_ref)
    }

    /// Number of provider calls made so far
    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn points(n: u32) -> Vec<PricePoint> {
        (1..=n).map(|d| PricePoint::new(day(d), 100.0 + d as f64)).collect()
    }

    #[test]
    fn test_history_validation() {
        assert!(PriceHistory::new(points(5)).is_ok());

        let mut bad = points(5);
        bad[3].close = -1.0;
        assert!(matches!(
            PriceHistory::new(bad),
            Err(SearchError::InvalidPrice { index: 3, .. })
        ));

        let mut unordered = points(5);
        unordered.swap(1, 2);
        assert!(PriceHistory::new(unordered).is_err());
    }

    #[test]
    fn test_position_on_or_before() {
        let mut pts = points(10);
        pts.remove(4); // no 5th
        let h = PriceHistory::new(pts).unwrap();
        assert_eq!(h.position_on_or_before(day(4)), Some(3));
        assert_eq!(h.position_on_or_before(day(5)), Some(3));
        assert_eq!(h.position_on_or_before(day(6)), Some(4));
        assert_eq!(
            h.position_on_or_before(NaiveDate::from_ymd_opt(2024, 4, 30).unwrap()),
            None
        );
    }

    #[test]
    fn test_windows() {
        let h = PriceHistory::new(points(10)).unwrap();
        assert_eq!(h.closes_ending_at(4, 3), Some(vec![103.0, 104.0, 105.0]));
        assert_eq!(h.closes_ending_at(1, 3), None);
        assert_eq!(h.closes_ending_at(10, 3), None);
        assert_eq!(h.forward_closes(7, 2), Some(vec![108.0, 109.0, 110.0]));
        assert_eq!(h.forward_closes(8, 2), None);
    }

    #[test]
    fn test_memory_provider_lookback() {
        let mut provider = MemoryPriceHistory::new();
        provider.insert("AAPL", points(10)).unwrap();

        assert_eq!(provider.get("AAPL", Lookback::Max).unwrap().len(), 10);
        let last3 = provider.get("AAPL", Lookback::Days(3)).unwrap();
        assert_eq!(last3.len(), 3);
        assert_eq!(last3[0].date, day(8));
        assert!(matches!(
            provider.get("MSFT", Lookback::Max),
            Err(SearchError::HistoryUnavailable { .. })
        ));
    }

    struct Counting {
        inner: MemoryPriceHistory,
        calls: AtomicUsize,
    }

    impl PriceHistoryProvider for Counting {
        fn get(&self, symbol: &str, lookback: Lookback) -> Result<Vec<PricePoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(symbol, lookback)
        }
    }

    #[test]
    fn test_cache_memoizes_hits_and_misses() {
        let mut inner = MemoryPriceHistory::new();
        inner.insert("AAPL", points(10)).unwrap();
        let provider = Counting {
            inner,
            calls: AtomicUsize::new(0),
        };

        let mut cache = PriceCache::new();
        assert!(cache.load(&provider, "AAPL").is_some());
        assert!(cache.load(&provider, "AAPL").is_some());
        assert!(cache.load(&provider, "MSFT").is_none());
        assert!(cache.load(&provider, "MSFT").is_none());

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.fetches(), 2);
        assert!(cache.get("AAPL").is_some());
    }
}
