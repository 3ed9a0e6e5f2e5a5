//! Temporal de-duplication of coarse hits
//!
//! Neighbouring days of one symbol produce near-identical charts, so a raw
//! top-N list is usually a handful of episodes repeated many times. The filter
//! walks hits in index order and keeps a hit only if no already-kept date of
//! the same symbol lies within `isolation_days` (inclusive). Reserved spans,
//! such as the query's own window, block their whole range plus the same
//! margin on either side.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::catalog::CatalogEntry;
use crate::{CoarseHit, MetadataCatalog};

/// A coarse hit joined with its catalog entry
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResolvedCandidate {
    /// Position in the index's result list; the final tie-breaker
    pub coarse_rank: usize,
    pub hit: CoarseHit,
    pub entry: CatalogEntry,
}

/// Per-request set of accepted dates and reserved spans, keyed by symbol
///
/// An accepted date is stored as the one-day span `(date, date)`.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    isolation_days: u32,
    accepted: HashMap<String, Vec<(NaiveDate, NaiveDate)>>,
}

/// Days from `date` to the closed span `[start, end]`, zero inside it
fn days_outside(date: NaiveDate, (start, end): (NaiveDate, NaiveDate)) -> i64 {
    if date < start {
        (start - date).num_days()
    } else if date > end {
        (date - end).num_days()
    } else {
        0
    }
}

impl CandidateFilter {
    /// `isolation_days = 0` disables the filter
    pub fn new(isolation_days: u32) -> Self {
        Self {
            isolation_days,
            accepted: HashMap::new(),
        }
    }

    #[inline]
    pub fn isolation_days(&self) -> u32 {
        self.isolation_days
    }

    /// True if `date` is more than `isolation_days` away from every accepted
    /// date and reserved span of `symbol`
    pub fn is_isolated(&self, symbol: &str, date: NaiveDate) -> bool {
        if self.isolation_days == 0 {
            return true;
        }
        let limit = i64::from(self.isolation_days);
        self.accepted.get(symbol).map_or(true, |dates| {
            dates
                .iter()
                .all(|&span| days_outside(date, span) > limit)
        })
    }

    /// Accept `date` for `symbol` if it is isolated; accepted dates constrain
    /// every later call
    pub fn admit(&mut self, symbol: &str, date: NaiveDate) -> bool {
        if !self.is_isolated(symbol, date) {
            return false;
        }
        self.reserve(symbol, date, date);
        true
    }

    /// Block `[start, end]` and its neighbourhood without producing a
    /// candidate
    pub fn reserve(&mut self, symbol: &str, start: NaiveDate, end: NaiveDate) {
        let span = if start <= end { (start, end) } else { (end, start) };
        self.accepted
            .entry(symbol.to_string())
            .or_default()
            .push(span);
    }

    /// Resolve and de-duplicate `hits`, preserving their order
    ///
    /// Hits the catalog cannot resolve are logged and skipped.
    pub fn filter_hits(
        &mut self,
        hits: &[CoarseHit],
        catalog: &dyn MetadataCatalog,
    ) -> Vec<ResolvedCandidate> {
        let mut out = Vec::with_capacity(hits.len());
        let mut rejected = 0usize;

        for (coarse_rank, hit) in hits.iter().enumerate() {
            let entry = match catalog.resolve(hit.vector_id) {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(%error, "dropping unresolvable hit");
                    continue;
                }
            };
            if !self.admit(&entry.symbol, entry.date) {
                rejected += 1;
                continue;
            }
            out.push(ResolvedCandidate {
                coarse_rank,
                hit: *hit,
                entry,
            });
        }

        debug!(
            kept = out.len(),
            rejected,
            isolation_days = self.isolation_days,
            "filtered coarse hits"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::VectorId;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + chrono::Days::new(d as u64)
    }

    #[test]
    fn test_inclusive_window() {
        let mut f = CandidateFilter::new(20);
        assert!(f.admit("AAPL", day(0)));
        assert!(!f.admit("AAPL", day(20)));
        assert!(f.admit("AAPL", day(21)));
        assert!(f.admit("MSFT", day(1)));
    }

    #[test]
    fn test_compares_against_all_acceptances() {
        let mut f = CandidateFilter::new(10);
        assert!(f.admit("AAPL", day(100)));
        assert!(f.admit("AAPL", day(50)));
        // 45 collides with the later acceptance, 95 with the earlier one
        assert!(!f.admit("AAPL", day(45)));
        assert!(!f.admit("AAPL", day(95)));
        assert!(f.admit("AAPL", day(75)));
    }

    #[test]
    fn test_disabled() {
        let mut f = CandidateFilter::new(0);
        assert!(f.admit("AAPL", day(5)));
        assert!(f.admit("AAPL", day(5)));
    }

    #[test]
    fn test_reserve_blocks_neighbourhood() {
        let mut f = CandidateFilter::new(5);
        f.reserve("AAPL", day(30), day(30));
        assert!(!f.admit("AAPL", day(27)));
        assert!(f.admit("AAPL", day(40)));
    }

    #[test]
    fn test_reserve_blocks_whole_span() {
        let mut f = CandidateFilter::new(20);
        f.reserve("AAPL", day(100), day(159));
        assert!(!f.is_isolated("AAPL", day(80)));
        assert!(!f.is_isolated("AAPL", day(120)));
        assert!(!f.is_isolated("AAPL", day(179)));
        assert!(f.is_isolated("AAPL", day(79)));
        assert!(f.is_isolated("AAPL", day(180)));
        assert!(f.is_isolated("MSFT", day(120)));
    }

    #[test]
    fn test_disabled_ignores_reservations() {
        let mut f = CandidateFilter::new(0);
        f.reserve("AAPL", day(100), day(159));
        assert!(f.admit("AAPL", day(120)));
    }

    #[test]
    fn test_filter_hits() {
        let catalog: InMemoryCatalog = [
            (VectorId(1), CatalogEntry::new("AAPL", day(10), "a")),
            (VectorId(2), CatalogEntry::new("AAPL", day(12), "b")),
            (VectorId(3), CatalogEntry::new("MSFT", day(11), "c")),
            (VectorId(4), CatalogEntry::new("AAPL", day(40), "d")),
        ]
        .into_iter()
        .collect();

        let hits: Vec<CoarseHit> = [1, 2, 99, 3, 4]
            .into_iter()
            .map(|id| CoarseHit {
                raw_score: 0.9,
                vector_id: VectorId(id),
            })
            .collect();

        let mut f = CandidateFilter::new(20);
        let kept = f.filter_hits(&hits, &catalog);
        let ids: Vec<_> = kept.iter().map(|c| c.hit.vector_id).collect();
        assert_eq!(ids, vec![VectorId(1), VectorId(3), VectorId(4)]);
        let ranks: Vec<_> = kept.iter().map(|c| c.coarse_rank).collect();
        assert_eq!(ranks, vec![0, 3, 4]);
    }
}
