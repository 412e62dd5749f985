use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::ProviderError;
use crate::series::PriceRow;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches daily rows for `symbol`.
    ///
    /// `since = None` requests the entire available history; `Some(date)`
    /// requests rows strictly after that date. An empty Vec (not an error)
    /// means the provider has no data for the symbol, or nothing new since
    /// `since`. Returned rows carry raw fields only; derived fields are left
    /// absent for the enrichment step.
    async fn fetch(
        &self,
        symbol: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceRow>, ProviderError>;
}
