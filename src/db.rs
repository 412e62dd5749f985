//! SQLite connection management.
//!
//! The store handle is an explicit pool created once by the caller and shared
//! by the repositories; there is no module-level connection state. Lifecycle
//! is `init -> use across many sync calls -> drop`, with each operation
//! acquiring a pooled connection for its own duration.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::debug;

use crate::errors::{Result, StorageError};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Prepares the database file and returns a connection pool for it.
///
/// Creates the parent directory and the database file if they do not exist.
/// WAL mode is applied once here; per-connection PRAGMAs are applied by the
/// pool customizer on every acquire.
pub fn init(db_path: &str) -> Result<Arc<DbPool>> {
    if let Some(db_dir) = Path::new(db_path).parent() {
        if !db_dir.as_os_str().is_empty() && !db_dir.exists() {
            fs::create_dir_all(db_dir).map_err(StorageError::Io)?;
        }
    }

    {
        let mut conn =
            SqliteConnection::establish(db_path).map_err(StorageError::ConnectionFailed)?;
        conn.batch_execute("PRAGMA journal_mode = WAL;")
            .map_err(StorageError::QueryFailed)?;
    }

    debug!("Opened price database at {}", db_path);
    create_pool(db_path)
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .connection_timeout(std::time::Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionCustomizer {}))
        .build(manager)
        .map_err(StorageError::PoolCreationFailed)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    pool.get()
        .map_err(|e| StorageError::ConnectionAcquireFailed(e).into())
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        use diesel::RunQueryDsl;

        diesel::sql_query(
            "\n            PRAGMA foreign_keys = ON;\n            PRAGMA busy_timeout = 30000;\n            PRAGMA synchronous = NORMAL;\n        ",
        )
        .execute(conn)
        .map_err(diesel::r2d2::Error::QueryError)?;

        Ok(())
    }
}
