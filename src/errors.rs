use chrono::NaiveDate;
use thiserror::Error;
use yahoo_finance_api::YahooError;

// Create a type alias for Result using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the price archive.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid symbol: '{0}'")]
    InvalidSymbol(String),

    #[error("No data available for symbol '{0}'")]
    NoDataAvailable(String),

    #[error("Provider request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Enrichment failed: {0}")]
    Enrichment(#[from] EnrichmentError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(#[from] diesel::result::ConnectionError),

    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(#[from] r2d2::Error),

    #[error("Failed to acquire database connection from pool: {0}")]
    ConnectionAcquireFailed(r2d2::Error),

    #[error("Database query failed: {0}")]
    QueryFailed(#[from] diesel::result::Error),

    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt date value in store: {0}")]
    CorruptDate(String),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Cannot compute volatility from close price on {0}")]
    InvalidClose(NaiveDate),
}

impl From<YahooError> for ProviderError {
    fn from(error: YahooError) -> Self {
        match error {
            YahooError::FetchFailed(e) => ProviderError::FetchFailed(e),
            other => ProviderError::InvalidResponse(other.to_string()),
        }
    }
}

// Implement From for DieselError to Error directly
impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        Error::Storage(StorageError::QueryFailed(err))
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Storage(StorageError::PoolCreationFailed(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(StorageError::Io(err))
    }
}
