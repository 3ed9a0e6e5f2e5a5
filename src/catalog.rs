//! Vector-id metadata
//!
//! [`InMemoryCatalog`] is the reference [`MetadataCatalog`]: it is filled once
//! at startup and only read afterwards, so it can be shared behind an `Arc`
//! without locking.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::{MetadataCatalog, Result, SearchError, VectorId};

/// Where an indexed embedding came from
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CatalogEntry {
    pub symbol: String,
    /// Last observation of the charted window
    pub date: NaiveDate,
    /// Source artifact (chart image, cache file, ...)
    pub path: String,
}

impl CatalogEntry {
    pub fn new(symbol: impl Into<String>, date: NaiveDate, path: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            path: path.into(),
        }
    }
}

/// Hash-map catalog with per-symbol date-sorted lookups
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: HashMap<VectorId, CatalogEntry>,
    by_symbol: HashMap<String, Vec<(NaiveDate, VectorId)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry. A repeated id replaces the previous entry.
    pub fn insert(&mut self, id: VectorId, entry: CatalogEntry) {
        if let Some(old) = self.entries.remove(&id) {
            if let Some(dates) = self.by_symbol.get_mut(&old.symbol) {
                dates.retain(|&(_, v)| v != id);
            }
        }

        let dates = self.by_symbol.entry(entry.symbol.clone()).or_default();
        let pos = dates.partition_point(|&(d, v)| (d, v) < (entry.date, id));
        dates.insert(pos, (entry.date, id));
        self.entries.insert(id, entry);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.by_symbol.keys().map(String::as_str)
    }
}

impl FromIterator<(VectorId, CatalogEntry)> for InMemoryCatalog {
    fn from_iter<I: IntoIterator<Item = (VectorId, CatalogEntry)>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for (id, entry) in iter {
            catalog.insert(id, entry);
        }
        catalog
    }
}

impl MetadataCatalog for InMemoryCatalog {
    fn resolve(&self, id: VectorId) -> Result<CatalogEntry> {
        self.entries
            .get(&id)
            .cloned()
            .ok_or(SearchError::ResolutionFailure { vector_id: id })
    }

    fn nearest_on_or_before(&self, symbol: &str, date: NaiveDate) -> Option<VectorId> {
        let dates = self.by_symbol.get(symbol)?;
        let end = dates.partition_point(|&(d, _)| d <= date);
        // Several ids on one date: the highest id wins.
        end.checked_sub(1).map(|i| dates[i].1)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample() -> InMemoryCatalog {
        [
            (VectorId(1), CatalogEntry::new("AAPL", day(4), "aapl/04.png")),
            (VectorId(2), CatalogEntry::new("AAPL", day(8), "aapl/08.png")),
            (VectorId(3), CatalogEntry::new("MSFT", day(5), "msft/05.png")),
            (VectorId(4), CatalogEntry::new("AAPL", day(6), "aapl/06.png")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_resolve() {
        let catalog = sample();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.resolve(VectorId(3)).unwrap().symbol, "MSFT");
        assert!(matches!(
            catalog.resolve(VectorId(99)),
            Err(SearchError::ResolutionFailure { vector_id: VectorId(99) })
        ));
    }

    #[test]
    fn test_nearest_on_or_before() {
        let catalog = sample();
        assert_eq!(catalog.nearest_on_or_before("AAPL", day(6)), Some(VectorId(4)));
        assert_eq!(catalog.nearest_on_or_before("AAPL", day(7)), Some(VectorId(4)));
        assert_eq!(catalog.nearest_on_or_before("AAPL", day(30)), Some(VectorId(2)));
        assert_eq!(catalog.nearest_on_or_before("AAPL", day(3)), None);
        assert_eq!(catalog.nearest_on_or_before("TSLA", day(9)), None);
    }

    #[test]
    fn test_reinsert_moves_entry() {
        let mut catalog = sample();
        catalog.insert(VectorId(2), CatalogEntry::new("MSFT", day(9), "msft/09.png"));

        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.nearest_on_or_before("AAPL", day(30)), Some(VectorId(4)));
        assert_eq!(catalog.nearest_on_or_before("MSFT", day(30)), Some(VectorId(2)));
    }
}
