//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by record access.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`, so `otp.user_id` is enforced.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Creates the file when it does not exist yet.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    let conn = Connection::open(path).map_err(|err| {
        error!(
            "event=db_open module=db status=error mode=file duration_ms={} error_code=db_open_failed error={}",
            started_at.elapsed().as_millis(),
            err
        );
        err
    })?;

    finish_open(conn, "file", started_at)
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// Every call yields an independent, empty database.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let conn = Connection::open_in_memory().map_err(|err| {
        error!(
            "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_open_failed error={}",
            started_at.elapsed().as_millis(),
            err
        );
        err
    })?;

    finish_open(conn, "memory", started_at)
}

/// Applies per-connection pragmas without running migrations.
///
/// Used for pooled connections whose database was already migrated by
/// [`open_db`] at startup.
pub fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

fn finish_open(mut conn: Connection, mode: &str, started_at: Instant) -> DbResult<Connection> {
    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    configure_connection(conn)?;
    apply_migrations(conn)?;
    Ok(())
}
