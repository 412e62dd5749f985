//! Derived-indicator enrichment.
//!
//! Enrichment is a pure pass over a batch of rows: same row count, same date
//! set, only the derived fields change. The sync service invokes it after a
//! fetch and before the merge; raw OHLCV fields survive even when enrichment
//! fails.

use crate::errors::EnrichmentError;
use crate::series::PriceRow;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Default look-back of one trading month.
pub const DEFAULT_VOLATILITY_WINDOW: usize = 21;

pub trait Enrich: Send + Sync {
    /// Populates derived fields on `rows`, leaving every raw field and the
    /// date set untouched.
    fn enrich(&self, rows: Vec<PriceRow>) -> Result<Vec<PriceRow>, EnrichmentError>;
}

/// Rolling close-to-close volatility.
///
/// `historical_volatility` is the sample standard deviation of daily
/// percentage returns over the trailing window; `annualized_volatility`
/// scales it by `sqrt(252)`. Rows without a full window of look-back within
/// the batch keep both fields absent.
pub struct VolatilityEnricher {
    window: usize,
}

impl VolatilityEnricher {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for VolatilityEnricher {
    fn default() -> Self {
        Self::new(DEFAULT_VOLATILITY_WINDOW)
    }
}

impl Enrich for VolatilityEnricher {
    fn enrich(&self, mut rows: Vec<PriceRow>) -> Result<Vec<PriceRow>, EnrichmentError> {
        for row in &rows {
            if !row.close.is_finite() || row.close <= 0.0 {
                return Err(EnrichmentError::InvalidClose(row.date));
            }
        }

        if rows.len() <= self.window {
            return Ok(rows);
        }

        let returns: Vec<f64> = rows
            .windows(2)
            .map(|pair| pair[1].close / pair[0].close - 1.0)
            .collect();

        for i in self.window..rows.len() {
            let std = sample_std(&returns[i - self.window..i]);
            rows[i].historical_volatility = Some(std);
            rows[i].annualized_volatility = Some(std * TRADING_DAYS_PER_YEAR.sqrt());
        }

        Ok(rows)
    }
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
