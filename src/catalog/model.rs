use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Registry record of the most recent successful sync for one symbol.
///
/// `last_updated` is a UTC timestamp recording when the symbol was last
/// checked against the provider, which may or may not have added rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub symbol: String,
    pub last_updated: NaiveDateTime,
}
