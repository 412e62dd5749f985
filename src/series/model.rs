use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use serde::{Deserialize, Serialize};

use crate::errors::StorageError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One daily bar of a symbol's series.
///
/// `open` through `stock_splits` come raw from the provider; the two
/// volatility fields are derived by the enrichment step and stay `None`
/// until it has run (or when the row lacks the look-back it needs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub dividends: f64,
    pub stock_splits: f64,
    pub historical_volatility: Option<f64>,
    pub annualized_volatility: Option<f64>,
}

impl PriceRow {
    /// A raw provider row: corporate actions default to zero, derived fields
    /// to absent.
    pub fn raw(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        PriceRow {
            date,
            open,
            high,
            low,
            close,
            volume,
            dividends: 0.0,
            stock_splits: 0.0,
            historical_volatility: None,
            annualized_volatility: None,
        }
    }
}

/// Raw-SQL row mapping for the dynamic per-symbol tables.
#[derive(QueryableByName)]
pub(crate) struct PriceRowDB {
    #[diesel(sql_type = Text)]
    pub date: String,
    #[diesel(sql_type = Double)]
    pub open: f64,
    #[diesel(sql_type = Double)]
    pub high: f64,
    #[diesel(sql_type = Double)]
    pub low: f64,
    #[diesel(sql_type = Double)]
    pub close: f64,
    #[diesel(sql_type = BigInt)]
    pub volume: i64,
    #[diesel(sql_type = Double)]
    pub dividends: f64,
    #[diesel(sql_type = Double)]
    pub stock_splits: f64,
    #[diesel(sql_type = Nullable<Double>)]
    pub historical_volatility: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub annualized_volatility: Option<f64>,
}

impl TryFrom<PriceRowDB> for PriceRow {
    type Error = StorageError;

    fn try_from(row: PriceRowDB) -> Result<Self, Self::Error> {
        let date = NaiveDate::parse_from_str(&row.date, DATE_FORMAT)
            .map_err(|_| StorageError::CorruptDate(row.date.clone()))?;

        Ok(PriceRow {
            date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            dividends: row.dividends,
            stock_splits: row.stock_splits,
            historical_volatility: row.historical_volatility,
            annualized_volatility: row.annualized_volatility,
        })
    }
}
