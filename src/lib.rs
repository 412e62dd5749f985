pub mod db;

pub mod catalog;
pub mod enrich;
pub mod errors;
pub mod provider;
pub mod series;
pub mod sync;

pub use errors::{Error, Result};
pub use sync::{PriceSyncService, SymbolSyncOutcome, SyncResult};
