//! Price synchronization service.
//!
//! This module provides the `PriceSyncService` which brings a symbol's local
//! series up to date with the market-data provider.
//!
//! # Architecture
//!
//! ```text
//! PriceSyncService
//!       │
//!       ├─► MarketDataProvider (fetch raw daily rows)
//!       ├─► Enrich             (derived volatility fields)
//!       ├─► SeriesRepository   (per-symbol price tables)
//!       └─► CatalogRepository  (last-sync timestamps)
//! ```
//!
//! The incremental contract: the fetch window is always
//! `(last_local_date, now]`, dates already held locally are never
//! re-requested, and the provider's own trading calendar is authoritative
//! for which days exist.

pub mod service;

#[cfg(test)]
mod service_tests;

pub use service::{PriceSyncService, SymbolSyncOutcome, SyncResult};
