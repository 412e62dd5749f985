use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::debug;
use yahoo::YahooError;
use yahoo_finance_api as yahoo;

use super::traits::MarketDataProvider;
use crate::errors::ProviderError;
use crate::series::PriceRow;

pub struct YahooProvider {
    provider: yahoo::YahooConnector,
}

impl YahooProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let provider = yahoo::YahooConnector::new().map_err(ProviderError::from)?;
        Ok(YahooProvider { provider })
    }

    fn rows_from_response(response: &yahoo::YResponse) -> Result<Vec<PriceRow>, ProviderError> {
        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(YahooError::NoQuotes) | Err(YahooError::NoResult) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Corporate actions ride along in the chart response; a response
        // without events just yields empty maps and the zero defaults stand.
        let dividends: HashMap<NaiveDate, f64> = response
            .dividends()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|d| timestamp_to_date(d.date).map(|day| (day, d.amount)))
            .collect();
        let splits: HashMap<NaiveDate, f64> = response
            .splits()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| {
                if s.denominator == 0.0 {
                    return None;
                }
                timestamp_to_date(s.date).map(|day| (day, s.numerator / s.denominator))
            })
            .collect();

        let rows = quotes
            .into_iter()
            .filter_map(|q| {
                timestamp_to_date(q.timestamp).map(|date| {
                    let mut row = PriceRow::raw(
                        date,
                        q.open,
                        q.high,
                        q.low,
                        q.close,
                        q.volume as i64,
                    );
                    row.dividends = dividends.get(&date).copied().unwrap_or(0.0);
                    row.stock_splits = splits.get(&date).copied().unwrap_or(0.0);
                    row
                })
            })
            .collect();

        Ok(rows)
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    async fn fetch(
        &self,
        symbol: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceRow>, ProviderError> {
        let response = match since {
            // Entire available history for a brand-new symbol.
            None => self.provider.get_quote_range(symbol, "1d", "max").await,
            // Only the window after the last locally held date.
            Some(last) => {
                let window_start = last.succ_opt().ok_or_else(|| {
                    ProviderError::InvalidResponse(format!("date out of range: {}", last))
                })?;
                let start: SystemTime = Utc
                    .from_utc_datetime(&window_start.and_hms_opt(0, 0, 0).unwrap())
                    .into();
                let end = SystemTime::now();

                debug!("Requesting {} history from {}", symbol, window_start);
                self.provider
                    .get_quote_history(symbol, start.into(), end.into())
                    .await
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(YahooError::NoQuotes) | Err(YahooError::NoResult) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Self::rows_from_response(&response)?;

        // Yahoo can return the boundary day itself; the contract is strictly
        // after `since`.
        if let Some(last) = since {
            rows.retain(|r| r.date > last);
        }
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);

        Ok(rows)
    }
}

fn timestamp_to_date(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
}
