//! C4 — chain and token discovery catalogs, per spec.md §4.2.
//!
//! Thin cached fetches over the aggregator's `/chains`, `/tokens` and
//! `/connections` endpoints. Destination-chain entries are hardcoded
//! rather than fetched, since the destination's own USDC/native addresses
//! are fixed protocol constants this crate already knows.

pub mod chain;
pub mod token;

pub use chain::ChainCatalog;
pub use token::TokenCatalog;

/// Wraps a successful catalog read with staleness metadata, used whenever
/// a fetch fails but a cached value can stand in (spec.md §4.2/§7).
#[derive(Debug, Clone)]
pub struct CatalogResult<T> {
    pub value: T,
    pub is_stale: bool,
    pub cached_at: Option<i64>,
}

impl<T> CatalogResult<T> {
    pub fn fresh(value: T) -> Self {
        Self { value, is_stale: false, cached_at: None }
    }

    pub fn stale(value: T, cached_at: i64) -> Self {
        Self { value, is_stale: true, cached_at: Some(cached_at) }
    }
}
