use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

use crate::catalog::{CatalogEntry, CatalogRepository};
use crate::db::DbPool;
use crate::enrich::Enrich;
use crate::errors::{Error, Result};
use crate::provider::MarketDataProvider;
use crate::series::{PriceRow, SeriesRepository};

lazy_static! {
    // The alphabet also keeps quoted table names collision-free.
    static ref SYMBOL_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._^-]*$").unwrap();
}

/// Summary of one successful `sync` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub symbol: String,
    /// Rows actually inserted (boundary duplicates excluded).
    pub added: usize,
    /// Whether the series table was created by this call.
    pub created: bool,
    /// The catalog timestamp written by this call.
    pub last_updated: NaiveDateTime,
    /// Set when enrichment failed and the raw rows were stored instead.
    pub enrichment_error: Option<String>,
}

/// Per-symbol outcome of a batch sync. One symbol failing never aborts the
/// rest of the batch.
#[derive(Debug)]
pub struct SymbolSyncOutcome {
    pub symbol: String,
    pub outcome: Result<SyncResult>,
}

/// Orchestrates, for one symbol at a time: read existing local range →
/// fetch the missing range → enrich → merge → update the catalog entry.
/// Holds no state between calls beyond the shared store handle.
pub struct PriceSyncService<P, E>
where
    P: MarketDataProvider,
    E: Enrich,
{
    provider: Arc<P>,
    enricher: Arc<E>,
    series: SeriesRepository,
    catalog: CatalogRepository,
}

impl<P, E> PriceSyncService<P, E>
where
    P: MarketDataProvider,
    E: Enrich,
{
    /// Wires the service against an open pool and ensures the catalog
    /// structure exists.
    pub fn new(pool: Arc<DbPool>, provider: Arc<P>, enricher: Arc<E>) -> Result<Self> {
        let catalog = CatalogRepository::new(pool.clone());
        catalog.ensure_initialized()?;

        Ok(Self {
            provider,
            enricher,
            series: SeriesRepository::new(pool),
            catalog,
        })
    }

    /// Brings one symbol's local series up to date with the provider.
    ///
    /// Exactly one provider request per call. Returns `NoDataAvailable` for
    /// a brand-new symbol the provider knows nothing about; an empty
    /// incremental fetch is a normal "already up to date" outcome that still
    /// refreshes the catalog timestamp.
    pub async fn sync(&self, symbol: &str) -> Result<SyncResult> {
        if !SYMBOL_RE.is_match(symbol) {
            return Err(Error::InvalidSymbol(symbol.to_string()));
        }

        let created = !self.series.table_exists(symbol)?;
        self.series.create_table(symbol)?;

        let last_local_date = self.series.last_date(symbol)?;
        debug!(
            "Syncing {} (last local date: {:?})",
            symbol, last_local_date
        );

        let fetched = match self.provider.fetch(symbol, last_local_date).await {
            Ok(fetched) => fetched,
            Err(e) => {
                // Same cleanup as the no-data case: a failed first attempt
                // must not leave an empty series table behind.
                if created {
                    self.series.drop_table(symbol)?;
                }
                return Err(Error::Provider(e));
            }
        };

        if fetched.is_empty() {
            if last_local_date.is_none() {
                // Brand-new symbol the provider has nothing for. Leave no
                // artifacts behind: the catalog entry exists iff the series
                // holds data.
                if created {
                    self.series.drop_table(symbol)?;
                }
                return Err(Error::NoDataAvailable(symbol.to_string()));
            }

            let now = Utc::now().naive_utc();
            self.catalog.upsert(symbol, now)?;
            debug!("{} already up to date", symbol);
            return Ok(SyncResult {
                symbol: symbol.to_string(),
                added: 0,
                created,
                last_updated: now,
                enrichment_error: None,
            });
        }

        // The provider can hand back the boundary day itself; stored rows
        // always win over a re-fetch.
        let mut rows: Vec<PriceRow> = match last_local_date {
            Some(last) => fetched.into_iter().filter(|r| r.date > last).collect(),
            None => fetched,
        };
        rows.sort_by_key(|r| r.date);

        let mut enrichment_error = None;
        match self.enricher.enrich(rows.clone()) {
            Ok(enriched) => {
                let same_shape = enriched.len() == rows.len()
                    && enriched.iter().zip(&rows).all(|(a, b)| a.date == b.date);
                if same_shape {
                    rows = enriched;
                } else {
                    warn!(
                        "Enrichment changed the row set for {}; storing raw rows",
                        symbol
                    );
                    enrichment_error =
                        Some("enriched row set does not match input".to_string());
                }
            }
            Err(e) => {
                warn!("Enrichment failed for {}: {}; storing raw rows", symbol, e);
                enrichment_error = Some(e.to_string());
            }
        }

        let added = self.series.append_rows(symbol, &rows)?;

        let now = Utc::now().naive_utc();
        self.catalog.upsert(symbol, now)?;

        debug!("Added {} rows for {}", added, symbol);
        Ok(SyncResult {
            symbol: symbol.to_string(),
            added,
            created,
            last_updated: now,
            enrichment_error,
        })
    }

    /// Sequentially syncs each symbol, collecting per-symbol outcomes.
    pub async fn sync_many(&self, symbols: &[String]) -> Vec<SymbolSyncOutcome> {
        let mut outcomes = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            let outcome = self.sync(symbol).await;
            if let Err(e) = &outcome {
                warn!("Sync failed for {}: {}", symbol, e);
            }
            outcomes.push(SymbolSyncOutcome {
                symbol: symbol.clone(),
                outcome,
            });
        }

        outcomes
    }

    /// Re-syncs every symbol already present in the catalog.
    pub async fn refresh_all(&self) -> Result<Vec<SymbolSyncOutcome>> {
        let symbols = self.catalog.symbols()?;
        Ok(self.sync_many(&symbols).await)
    }

    /// Catalog entry for `symbol`, if it has ever synced successfully.
    pub fn catalog_entry(&self, symbol: &str) -> Result<Option<CatalogEntry>> {
        self.catalog.get(symbol)
    }

    /// Full stored series for `symbol`, ascending by date.
    pub fn history(&self, symbol: &str) -> Result<Vec<PriceRow>> {
        if !SYMBOL_RE.is_match(symbol) {
            return Err(Error::InvalidSymbol(symbol.to_string()));
        }
        self.series.read_history(symbol)
    }

    /// Date-sliced stored series, endpoints inclusive, filtered in SQL.
    pub fn history_range(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceRow>> {
        if !SYMBOL_RE.is_match(symbol) {
            return Err(Error::InvalidSymbol(symbol.to_string()));
        }
        self.series.read_range(symbol, start, end)
    }
}
