//! Symbol catalog.
//!
//! The catalog is the registry of per-symbol last-sync timestamps: one row
//! per symbol, replaced on every successful sync. It records freshness of the
//! last *check*, not freshness of the data itself; the authoritative "does
//! this symbol exist" signal is the presence of its series table.

pub mod model;
pub mod repository;

pub use model::CatalogEntry;
pub use repository::CatalogRepository;
