//! Last-value price cache
//!
//! symbol -> most recently admitted price, for low-latency reads.
//! Same-symbol writers race: whichever write lands last wins, regardless
//! of tick timestamps.

use crate::core::Symbol;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct PriceCache {
    prices: RwLock<HashMap<Symbol, f64>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-write-wins upsert
    #[inline]
    pub fn set(&self, symbol: Symbol, price: f64) {
        self.prices.write().insert(symbol, price);
    }

    #[inline]
    pub fn get(&self, symbol: Symbol) -> Option<f64> {
        self.prices.read().get(&symbol).copied()
    }

    /// Point-in-time copy
    ///
    /// Holds the read lock only while entries are copied out.
    pub fn snapshot(&self) -> PriceSnapshot {
        let prices = self.prices.read();
        PriceSnapshot {
            prices: prices.iter().map(|(s, p)| (*s, *p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

/// Read-only view of the cache at one instant
///
/// Serializes as a flat `{"AAPL": 101.0}` object, ordered by symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceSnapshot {
    prices: BTreeMap<Symbol, f64>,
}

impl PriceSnapshot {
    pub fn get(&self, symbol: Symbol) -> Option<f64> {
        self.prices.get(&symbol).copied()
    }

    /// Lookup by symbol text; unknown or malformed names give `None`
    pub fn get_str(&self, symbol: &str) -> Option<f64> {
        Symbol::from_bytes(symbol.as_bytes()).and_then(|s| self.get(s))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, f64)> + '_ {
        self.prices.iter().map(|(s, p)| (*s, *p))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn sym(name: &str) -> Symbol {
        name.parse().unwrap()
    }

    #[test]
    fn test_last_write_wins() {
        let cache = PriceCache::new();
        cache.set(sym("AAPL"), 100.0);
        cache.set(sym("AAPL"), 101.0);
        assert_eq!(cache.get(sym("AAPL")), Some(101.0));
        assert_eq!(cache.get(sym("MSFT")), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let cache = PriceCache::new();
        cache.set(sym("AAPL"), 100.0);

        let snapshot = cache.snapshot();
        cache.set(sym("AAPL"), 200.0);
        cache.set(sym("TSLA"), 750.0);

        assert_eq!(snapshot.get_str("AAPL"), Some(100.0));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let cache = PriceCache::new();
        cache.set(sym("MSFT"), 299.5);
        cache.set(sym("AAPL"), 151.0);

        let json = cache.snapshot().to_json().unwrap();
        assert_eq!(json, r#"{"AAPL":151.0,"MSFT":299.5}"#);
    }

    #[test]
    fn test_get_str_rejects_bad_names() {
        let snapshot = PriceCache::new().snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.get_str(""), None);
        assert_eq!(snapshot.get_str("WAYTOOLONGNAME"), None);
    }

    #[test]
    fn test_concurrent_writers_distinct_symbols() {
        let cache = Arc::new(PriceCache::new());

        let handles: Vec<_> = (0..8)
            .map(|p| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let symbol = sym(&format!("S{}", p));
                    for i in 1..=1_000 {
                        cache.set(symbol, i as f64);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 8);
        assert!(snapshot.iter().all(|(_, price)| price == 1_000.0));
    }
}
