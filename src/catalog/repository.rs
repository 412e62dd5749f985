use std::sync::Arc;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Text, Timestamp};

use super::model::CatalogEntry;
use crate::db::{get_connection, DbPool};
use crate::errors::Result;

#[derive(QueryableByName)]
struct CatalogEntryDB {
    #[diesel(sql_type = Text)]
    symbol: String,
    #[diesel(sql_type = Timestamp)]
    last_updated: NaiveDateTime,
}

impl From<CatalogEntryDB> for CatalogEntry {
    fn from(row: CatalogEntryDB) -> Self {
        CatalogEntry {
            symbol: row.symbol,
            last_updated: row.last_updated,
        }
    }
}

#[derive(QueryableByName)]
struct SymbolRow {
    #[diesel(sql_type = Text)]
    symbol: String,
}

pub struct CatalogRepository {
    pool: Arc<DbPool>,
}

impl CatalogRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Creates the catalog table if it does not exist. Idempotent; safe to
    /// call on every startup.
    pub fn ensure_initialized(&self) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;

        sql_query(
            "CREATE TABLE IF NOT EXISTS catalog (
                symbol TEXT PRIMARY KEY NOT NULL,
                last_updated TIMESTAMP NOT NULL
            )",
        )
        .execute(&mut conn)?;

        Ok(())
    }

    /// Writes or replaces the entry for `symbol`. Exactly one row per symbol
    /// remains afterward.
    pub fn upsert(&self, symbol: &str, last_updated: NaiveDateTime) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;

        sql_query("INSERT OR REPLACE INTO catalog (symbol, last_updated) VALUES (?, ?)")
            .bind::<Text, _>(symbol)
            .bind::<Timestamp, _>(last_updated)
            .execute(&mut conn)?;

        Ok(())
    }

    /// Read-only lookup; a missing row is `None`, never an error.
    pub fn get(&self, symbol: &str) -> Result<Option<CatalogEntry>> {
        let mut conn = get_connection(&self.pool)?;

        let entry = sql_query("SELECT symbol, last_updated FROM catalog WHERE symbol = ?")
            .bind::<Text, _>(symbol)
            .get_result::<CatalogEntryDB>(&mut conn)
            .optional()?;

        Ok(entry.map(CatalogEntry::from))
    }

    /// All cataloged symbols, ordered for deterministic batch refreshes.
    pub fn symbols(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = sql_query("SELECT symbol FROM catalog ORDER BY symbol ASC")
            .load::<SymbolRow>(&mut conn)?;

        Ok(rows.into_iter().map(|r| r.symbol).collect())
    }
}
