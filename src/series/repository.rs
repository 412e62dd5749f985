use std::sync::Arc;

use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use log::debug;

use super::model::{PriceRow, PriceRowDB, DATE_FORMAT};
use crate::db::{get_connection, DbPool};
use crate::errors::{Result, StorageError};

const SERIES_COLUMNS: &str = "date, open, high, low, close, volume, dividends, stock_splits, \
     historical_volatility, annualized_volatility";

#[derive(QueryableByName)]
struct TableNameRow {
    #[diesel(sql_type = Text)]
    #[allow(dead_code)]
    name: String,
}

#[derive(QueryableByName)]
struct DateRow {
    #[diesel(sql_type = Text)]
    date: String,
}

#[derive(QueryableByName)]
struct MaxDateRow {
    #[diesel(sql_type = Nullable<Text>)]
    date: Option<String>,
}

pub struct SeriesRepository {
    pool: Arc<DbPool>,
}

impl SeriesRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Deterministic table name for a symbol. Symbols are validated by the
    /// sync service before they reach the repository, so quoting the name is
    /// enough to keep distinct symbols on distinct tables.
    fn table_name(symbol: &str) -> String {
        format!("{}_timeseries", symbol)
    }

    pub fn table_exists(&self, symbol: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;

        let row = sql_query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind::<Text, _>(Self::table_name(symbol))
            .get_result::<TableNameRow>(&mut conn)
            .optional()?;

        Ok(row.is_some())
    }

    /// Creates the series table for `symbol` if it does not exist.
    pub fn create_table(&self, symbol: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;

        sql_query(format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                date TEXT PRIMARY KEY NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume BIGINT NOT NULL,
                dividends REAL NOT NULL DEFAULT 0,
                stock_splits REAL NOT NULL DEFAULT 0,
                historical_volatility REAL,
                annualized_volatility REAL
            )",
            Self::table_name(symbol)
        ))
        .execute(&mut conn)?;

        Ok(())
    }

    /// Removes the series table. Used only to clean up an empty table created
    /// for a symbol the provider turned out to have no data for.
    pub fn drop_table(&self, symbol: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;

        sql_query(format!(
            "DROP TABLE IF EXISTS \"{}\"",
            Self::table_name(symbol)
        ))
        .execute(&mut conn)?;

        Ok(())
    }

    /// All stored dates for `symbol`, ascending. Empty for a fresh table.
    pub fn read_dates(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = sql_query(format!(
            "SELECT date FROM \"{}\" ORDER BY date ASC",
            Self::table_name(symbol)
        ))
        .load::<DateRow>(&mut conn)?;

        rows.into_iter()
            .map(|r| {
                NaiveDate::parse_from_str(&r.date, DATE_FORMAT)
                    .map_err(|_| StorageError::CorruptDate(r.date.clone()).into())
            })
            .collect()
    }

    /// Most recent stored date, pushed into SQL as `MAX(date)`.
    pub fn last_date(&self, symbol: &str) -> Result<Option<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;

        let row = sql_query(format!(
            "SELECT MAX(date) AS date FROM \"{}\"",
            Self::table_name(symbol)
        ))
        .get_result::<MaxDateRow>(&mut conn)?;

        match row.date {
            Some(text) => NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .map(Some)
                .map_err(|_| StorageError::CorruptDate(text.clone()).into()),
            None => Ok(None),
        }
    }

    /// Appends rows, ignoring any date that already exists in the table.
    /// The stored row always wins over a re-fetched duplicate. The whole
    /// batch runs in one transaction, so a failing row leaves nothing
    /// half-written. Returns the number of rows actually inserted.
    pub fn append_rows(&self, symbol: &str, rows: &[PriceRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = get_connection(&self.pool)?;
        let table = Self::table_name(symbol);

        let insert = format!(
            "INSERT OR IGNORE INTO \"{}\" ({})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            table, SERIES_COLUMNS
        );

        let added = conn.transaction::<usize, crate::errors::Error, _>(|conn| {
            let mut added = 0;
            for row in rows {
                added += sql_query(&insert)
                    .bind::<Text, _>(row.date.format(DATE_FORMAT).to_string())
                    .bind::<Double, _>(row.open)
                    .bind::<Double, _>(row.high)
                    .bind::<Double, _>(row.low)
                    .bind::<Double, _>(row.close)
                    .bind::<BigInt, _>(row.volume)
                    .bind::<Double, _>(row.dividends)
                    .bind::<Double, _>(row.stock_splits)
                    .bind::<Nullable<Double>, _>(row.historical_volatility)
                    .bind::<Nullable<Double>, _>(row.annualized_volatility)
                    .execute(conn)?;
            }
            Ok(added)
        })?;

        debug!("Appended {}/{} rows to {}", added, rows.len(), table);
        Ok(added)
    }

    /// Full series for `symbol`, ascending by date.
    pub fn read_history(&self, symbol: &str) -> Result<Vec<PriceRow>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = sql_query(format!(
            "SELECT {} FROM \"{}\" ORDER BY date ASC",
            SERIES_COLUMNS,
            Self::table_name(symbol)
        ))
        .load::<PriceRowDB>(&mut conn)?;

        rows.into_iter()
            .map(|r| PriceRow::try_from(r).map_err(Into::into))
            .collect()
    }

    /// Date-sliced series, both endpoints inclusive. The filter runs in the
    /// SQL WHERE clause rather than over a materialized series.
    pub fn read_range(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceRow>> {
        let mut conn = get_connection(&self.pool)?;

        let mut sql = format!(
            "SELECT {} FROM \"{}\"",
            SERIES_COLUMNS,
            Self::table_name(symbol)
        );
        let mut clauses = Vec::new();
        if let Some(start) = start {
            clauses.push(format!("date >= '{}'", start.format(DATE_FORMAT)));
        }
        if let Some(end) = end {
            clauses.push(format!("date <= '{}'", end.format(DATE_FORMAT)));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date ASC");

        let rows = sql_query(sql).load::<PriceRowDB>(&mut conn)?;

        rows.into_iter()
            .map(|r| PriceRow::try_from(r).map_err(Into::into))
            .collect()
    }
}
