use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::price_store::PriceStore;
use crate::types::{Observation, Price, SymbolId};

/// In-process price store. Data lives as long as the value does.
#[derive(Default)]
pub struct MemoryPriceStore {
    symbols: RwLock<HashMap<String, SymbolId>>,
    prices: RwLock<HashMap<SymbolId, Vec<Observation>>>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of symbol records.
    pub fn symbol_count(&self) -> usize {
        self.symbols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// All observations for `id`, in insertion order.
    pub fn observations(&self, id: SymbolId) -> Vec<Observation> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn resolve_symbol(&self, name: &str) -> Result<SymbolId, StoreError> {
        let mut symbols = self.symbols.write().unwrap_or_else(PoisonError::into_inner);
        let id = *symbols
            .entry(name.to_string())
            .or_insert_with(SymbolId::generate);
        Ok(id)
    }

    async fn lookup_symbol(&self, name: &str) -> Result<Option<SymbolId>, StoreError> {
        let symbols = self.symbols.read().unwrap_or_else(PoisonError::into_inner);
        Ok(symbols.get(name).copied())
    }

    async fn record_price(
        &self,
        id: SymbolId,
        price: Price,
        observed_at: i64,
    ) -> Result<(), StoreError> {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices
            .entry(id)
            .or_default()
            .push(Observation { price, observed_at });
        Ok(())
    }

    async fn nearest_price(&self, id: SymbolId, target: i64) -> Result<Observation, StoreError> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices
            .get(&id)
            .and_then(|rows| rows.iter().min_by_key(|o| o.observed_at.abs_diff(target)))
            .copied()
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_creates_once() {
        let store = MemoryPriceStore::new();

        let first = store.resolve_symbol("BTC").await.unwrap();
        let second = store.resolve_symbol("BTC").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.symbol_count(), 1);
    }

    #[tokio::test]
    async fn symbols_are_case_sensitive() {
        let store = MemoryPriceStore::new();

        let upper = store.resolve_symbol("BTC").await.unwrap();
        let lower = store.resolve_symbol("btc").await.unwrap();

        assert_ne!(upper, lower);
        assert_eq!(store.symbol_count(), 2);
    }

    #[tokio::test]
    async fn lookup_does_not_create() {
        let store = MemoryPriceStore::new();

        assert_eq!(store.lookup_symbol("ETH").await.unwrap(), None);
        assert_eq!(store.symbol_count(), 0);

        let id = store.resolve_symbol("ETH").await.unwrap();
        assert_eq!(store.lookup_symbol("ETH").await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn record_is_append_only() {
        let store = MemoryPriceStore::new();
        let id = store.resolve_symbol("BTC").await.unwrap();

        store.record_price(id, Price::from_cents(100), 10).await.unwrap();
        store.record_price(id, Price::from_cents(100), 10).await.unwrap();

        assert_eq!(store.observations(id).len(), 2);
    }

    #[tokio::test]
    async fn nearest_without_rows_is_not_found() {
        let store = MemoryPriceStore::new();
        let id = store.resolve_symbol("BTC").await.unwrap();

        let err = store.nearest_price(id, 100).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn concurrent_first_sight_yields_one_record() {
        let store = std::sync::Arc::new(MemoryPriceStore::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.resolve_symbol("SOL").await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.symbol_count(), 1);
    }
}
