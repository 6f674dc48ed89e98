//! Pooled SQLite connections for request handlers.
//!
//! # Invariants
//! - The database file is migrated once, before the pool hands out connections.
//! - Every pooled connection has the same pragmas as `open_db` connections.

use log::info;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use social_core::db::{configure_connection, open_db, DbError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

#[derive(Debug)]
pub enum PoolError {
    Db(DbError),
    Pool(r2d2::Error),
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool error: {err}"),
        }
    }
}

impl Error for PoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Pool(err) => Some(err),
        }
    }
}

impl From<DbError> for PoolError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<r2d2::Error> for PoolError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}

#[derive(Debug)]
struct ConnectionPragmas;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        configure_connection(conn)
    }
}

/// Migrates the database at `path` and opens a pool of `size` connections.
pub fn open_pool(path: &Path, size: u32) -> Result<DbPool, PoolError> {
    drop(open_db(path)?);

    let pool = Pool::builder()
        .max_size(size)
        .connection_timeout(CONNECTION_TIMEOUT)
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(SqliteConnectionManager::file(path))?;
    info!(
        "event=pool_open module=api status=ok size={} path={}",
        size,
        path.display()
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::open_pool;

    #[test]
    fn pooled_connections_are_migrated_and_enforce_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("pool.sqlite3"), 2).unwrap();
        let conn = pool.get().unwrap();

        let foreign_keys: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0);
    }
}
