use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::service::PriceSyncService;
use crate::db;
use crate::enrich::{Enrich, VolatilityEnricher};
use crate::errors::{EnrichmentError, Error, ProviderError};
use crate::provider::MarketDataProvider;
use crate::series::PriceRow;

// =============================================================================
// Test doubles
// =============================================================================

/// In-memory provider with a fixed history per symbol.
///
/// Records every `(symbol, since)` request so tests can assert the fetch
/// window. With `honor_since` off it returns the full history regardless of
/// the requested window, simulating boundary-day overlap.
struct MockProvider {
    history: Mutex<HashMap<String, Vec<PriceRow>>>,
    failing: Mutex<HashSet<String>>,
    honor_since: bool,
    calls: Mutex<Vec<(String, Option<NaiveDate>)>>,
}

impl MockProvider {
    fn new() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            honor_since: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn overlapping() -> Self {
        Self {
            honor_since: false,
            ..Self::new()
        }
    }

    fn set_history(&self, symbol: &str, rows: Vec<PriceRow>) {
        self.history
            .lock()
            .unwrap()
            .insert(symbol.to_string(), rows);
    }

    fn fail_for(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }

    fn calls(&self) -> Vec<(String, Option<NaiveDate>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch(
        &self,
        symbol: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceRow>, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), since));

        if self.failing.lock().unwrap().contains(symbol) {
            return Err(ProviderError::FetchFailed("connection reset".to_string()));
        }

        let rows = self
            .history
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_default();

        Ok(match since {
            Some(last) if self.honor_since => {
                rows.into_iter().filter(|r| r.date > last).collect()
            }
            _ => rows,
        })
    }
}

/// Enricher that always fails, for the raw-rows-survive policy.
struct FailingEnricher;

impl Enrich for FailingEnricher {
    fn enrich(&self, rows: Vec<PriceRow>) -> Result<Vec<PriceRow>, EnrichmentError> {
        Err(EnrichmentError::InvalidClose(rows[0].date))
    }
}

/// Enricher that violates the same-row-set contract by dropping a row.
struct RowDroppingEnricher;

impl Enrich for RowDroppingEnricher {
    fn enrich(&self, mut rows: Vec<PriceRow>) -> Result<Vec<PriceRow>, EnrichmentError> {
        rows.pop();
        Ok(rows)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn day(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
}

fn row(date: &str, close: f64) -> PriceRow {
    PriceRow::raw(day(date), close, close + 1.0, close - 1.0, close, 1_000)
}

fn january_rows(days: std::ops::RangeInclusive<u32>) -> Vec<PriceRow> {
    days.map(|d| row(&format!("2020-01-{:02}", d), 100.0 + d as f64))
        .collect()
}

fn service_with<E: Enrich>(
    provider: Arc<MockProvider>,
    enricher: E,
) -> (PriceSyncService<MockProvider, E>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("prices.db");
    let pool = db::init(db_path.to_str().unwrap()).unwrap();
    let service = PriceSyncService::new(pool, provider, Arc::new(enricher)).unwrap();
    (service, dir)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_first_sync_fetches_entire_history() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    let result = service.sync("XOM").await.unwrap();

    assert!(result.created);
    assert_eq!(result.added, 5);
    assert!(result.enrichment_error.is_none());
    assert_eq!(provider.calls(), vec![("XOM".to_string(), None)]);

    let history = service.history("XOM").unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].date, day("2020-01-01"));
    assert_eq!(history[4].date, day("2020-01-05"));

    let entry = service.catalog_entry("XOM").unwrap().unwrap();
    assert_eq!(entry.symbol, "XOM");
    assert_eq!(entry.last_updated, result.last_updated);
}

#[tokio::test]
async fn test_second_sync_requests_only_the_gap() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    service.sync("XOM").await.unwrap();

    provider.set_history("XOM", january_rows(1..=7));
    let result = service.sync("XOM").await.unwrap();

    assert!(!result.created);
    assert_eq!(result.added, 2);
    assert_eq!(service.history("XOM").unwrap().len(), 7);

    // Windowing correctness: the second request is strictly after the last
    // local date, never the full history again.
    let calls = provider.calls();
    assert_eq!(calls[1], ("XOM".to_string(), Some(day("2020-01-05"))));
}

#[tokio::test]
async fn test_no_new_data_refreshes_catalog_only() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    let first = service.sync("XOM").await.unwrap();
    let before = service.history("XOM").unwrap();

    let second = service.sync("XOM").await.unwrap();

    assert_eq!(second.added, 0);
    assert!(!second.created);
    // Series unchanged, catalog timestamp monotonic: it records freshness of
    // the check, not of the data.
    assert_eq!(service.history("XOM").unwrap(), before);
    assert!(second.last_updated >= first.last_updated);
    assert_eq!(
        service.catalog_entry("XOM").unwrap().unwrap().last_updated,
        second.last_updated
    );
}

#[tokio::test]
async fn test_unknown_symbol_leaves_no_artifacts() {
    let provider = Arc::new(MockProvider::new());
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    let err = service.sync("DELISTED").await.unwrap_err();

    assert!(matches!(err, Error::NoDataAvailable(ref s) if s == "DELISTED"));
    assert!(service.catalog_entry("DELISTED").unwrap().is_none());
    // The table created for the attempt is dropped again, so a later history
    // read reports a missing table rather than an empty series.
    assert!(service.history("DELISTED").is_err());
}

#[tokio::test]
async fn test_provider_failure_on_first_sync_leaves_no_artifacts() {
    let provider = Arc::new(MockProvider::new());
    provider.fail_for("XOM");
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    let err = service.sync("XOM").await.unwrap_err();

    assert!(matches!(err, Error::Provider(ProviderError::FetchFailed(_))));
    assert!(service.catalog_entry("XOM").unwrap().is_none());
    // The table created for the attempt is gone again.
    assert!(service.history("XOM").is_err());
}

#[tokio::test]
async fn test_provider_failure_keeps_existing_series() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    service.sync("XOM").await.unwrap();
    provider.fail_for("XOM");

    assert!(service.sync("XOM").await.is_err());
    assert_eq!(service.history("XOM").unwrap().len(), 5);
    assert!(service.catalog_entry("XOM").unwrap().is_some());
}

#[tokio::test]
async fn test_boundary_overlap_keeps_local_rows() {
    let provider = Arc::new(MockProvider::overlapping());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    service.sync("XOM").await.unwrap();

    // The provider now replays the full history with changed closes plus two
    // genuinely new days. Only the new days may land.
    let mut replay: Vec<PriceRow> = january_rows(1..=7)
        .into_iter()
        .map(|mut r| {
            r.close += 50.0;
            r
        })
        .collect();
    replay[5].close -= 50.0;
    replay[6].close -= 50.0;
    provider.set_history("XOM", replay);

    let result = service.sync("XOM").await.unwrap();
    assert_eq!(result.added, 2);

    let history = service.history("XOM").unwrap();
    assert_eq!(history.len(), 7);
    // First five rows retain their original closes.
    assert_eq!(history[0].close, 101.0);
    assert_eq!(history[4].close, 105.0);
}

#[tokio::test]
async fn test_invalid_symbol_rejected_before_any_io() {
    let provider = Arc::new(MockProvider::new());
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    for bad in ["", "BAD SYMBOL", "x;DROP", "\"quoted\"", ".LEADING"] {
        let err = service.sync(bad).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSymbol(_)), "accepted {:?}", bad);
    }

    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_sync_many_isolates_failures() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=3));
    provider.set_history("TSLA", january_rows(1..=4));
    provider.fail_for("FSLR");
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    let symbols: Vec<String> = ["XOM", "FSLR", "TSLA", "GHOST"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let outcomes = service.sync_many(&symbols).await;

    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0].outcome.as_ref().unwrap().added, 3);
    assert!(matches!(
        outcomes[1].outcome,
        Err(Error::Provider(ProviderError::FetchFailed(_)))
    ));
    assert_eq!(outcomes[2].outcome.as_ref().unwrap().added, 4);
    assert!(matches!(outcomes[3].outcome, Err(Error::NoDataAvailable(_))));

    // Failures earlier in the batch never block later symbols.
    assert_eq!(service.history("TSLA").unwrap().len(), 4);
}

#[tokio::test]
async fn test_enrichment_failure_keeps_raw_rows() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), FailingEnricher);

    let result = service.sync("XOM").await.unwrap();

    assert_eq!(result.added, 5);
    assert!(result.enrichment_error.is_some());

    let history = service.history("XOM").unwrap();
    assert_eq!(history.len(), 5);
    assert!(history.iter().all(|r| r.historical_volatility.is_none()));
    // Catalog is still written: the rows themselves landed fine.
    assert!(service.catalog_entry("XOM").unwrap().is_some());
}

#[tokio::test]
async fn test_enrichment_shape_violation_keeps_raw_rows() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), RowDroppingEnricher);

    let result = service.sync("XOM").await.unwrap();

    assert_eq!(result.added, 5);
    assert!(result.enrichment_error.is_some());
    assert_eq!(service.history("XOM").unwrap().len(), 5);
}

#[tokio::test]
async fn test_enrichment_populates_derived_fields() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::new(2));

    service.sync("XOM").await.unwrap();

    let history = service.history("XOM").unwrap();
    assert!(history[0].historical_volatility.is_none());
    assert!(history[1].historical_volatility.is_none());
    assert!(history[2].historical_volatility.is_some());
    assert!(history[4].annualized_volatility.is_some());
}

#[tokio::test]
async fn test_repeated_sync_never_duplicates_dates() {
    let provider = Arc::new(MockProvider::overlapping());
    provider.set_history("XOM", january_rows(1..=5));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    for _ in 0..3 {
        service.sync("XOM").await.unwrap();
    }

    let dates: Vec<NaiveDate> = service
        .history("XOM")
        .unwrap()
        .iter()
        .map(|r| r.date)
        .collect();
    let mut deduped = dates.clone();
    deduped.dedup();
    assert_eq!(dates, deduped);
    assert_eq!(dates.len(), 5);
}

#[tokio::test]
async fn test_refresh_all_covers_every_cataloged_symbol() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=3));
    provider.set_history("TSLA", january_rows(1..=3));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    service.sync("XOM").await.unwrap();
    service.sync("TSLA").await.unwrap();

    provider.set_history("XOM", january_rows(1..=4));
    provider.set_history("TSLA", january_rows(1..=6));

    let outcomes = service.refresh_all().await.unwrap();

    assert_eq!(outcomes.len(), 2);
    // Catalog order is alphabetical.
    assert_eq!(outcomes[0].symbol, "TSLA");
    assert_eq!(outcomes[0].outcome.as_ref().unwrap().added, 3);
    assert_eq!(outcomes[1].symbol, "XOM");
    assert_eq!(outcomes[1].outcome.as_ref().unwrap().added, 1);
}

#[tokio::test]
async fn test_history_range_slices_inclusively() {
    let provider = Arc::new(MockProvider::new());
    provider.set_history("XOM", january_rows(1..=9));
    let (service, _dir) = service_with(provider.clone(), VolatilityEnricher::default());

    service.sync("XOM").await.unwrap();

    let slice = service
        .history_range("XOM", Some(day("2020-01-03")), Some(day("2020-01-06")))
        .unwrap();
    assert_eq!(slice.len(), 4);
    assert_eq!(slice[0].date, day("2020-01-03"));
    assert_eq!(slice[3].date, day("2020-01-06"));
}
