//! Per-symbol price series storage.
//!
//! Each symbol owns one SQLite table named `{symbol}_timeseries`, keyed by
//! calendar date. Rows are append-only: the repository never updates or
//! deletes a stored row, and appends ignore dates that already exist so a
//! re-fetch can never overwrite local data.

pub mod model;
pub mod repository;

pub use model::PriceRow;
pub use repository::SeriesRepository;
