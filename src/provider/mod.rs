//! Market-data providers.
//!
//! A provider hands back raw daily rows for a symbol on request. The trait
//! keeps the sync service testable and provider-agnostic; the shipped
//! implementation talks to Yahoo Finance.

pub mod traits;
pub mod yahoo;

pub use traits::MarketDataProvider;
pub use yahoo::YahooProvider;
