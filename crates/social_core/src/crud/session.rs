//! Unit of work over one borrowed SQLite connection.
//!
//! # Responsibility
//! - Stage writes until the caller (or a `SaveAction`) flushes them.
//! - Run flushed writes inside a transaction that `commit` finalizes.
//!
//! # Invariants
//! - The session borrows its connection; it never opens or closes one.
//! - Staged writes execute in staging order.
//! - A failed flush rolls the transaction back and drops the remaining
//!   staged writes.
//! - Dropping a session with an open transaction rolls it back.
//! - When the connection is already inside a caller-owned transaction, the
//!   session joins it and `commit` leaves finalization to that caller.

use super::schema::{RecordId, ID_COLUMN};
use super::{CrudError, CrudResult, SaveAction};
use log::{debug, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::collections::HashMap;

/// Handle to a staged insert, resolved to a row id once flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StageTicket(u64);

pub(crate) type StagedColumns = Vec<(&'static str, SqlValue)>;

#[derive(Debug)]
enum StagedWrite {
    Insert {
        ticket: StageTicket,
        table: &'static str,
        columns: StagedColumns,
    },
    Update {
        table: &'static str,
        id: RecordId,
        columns: StagedColumns,
    },
    Delete {
        table: &'static str,
        id: RecordId,
    },
}

/// Persistence session handed to every record access call.
///
/// Not shareable across threads; concurrent requests use one session each.
pub struct Session<'conn> {
    conn: &'conn Connection,
    staged: Vec<StagedWrite>,
    inserted_ids: HashMap<StageTicket, RecordId>,
    next_ticket: u64,
    in_transaction: bool,
}

impl<'conn> Session<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            staged: Vec::new(),
            inserted_ids: HashMap::new(),
            next_ticket: 0,
            in_transaction: false,
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Whether writes are staged but not yet flushed.
    pub fn has_pending(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Whether this session opened a transaction that is still running.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Applies a persistence strategy to the staged writes.
    pub fn handle(&mut self, action: SaveAction) -> CrudResult<()> {
        match action {
            SaveAction::Commit => self.commit(),
            SaveAction::Flush => self.flush(),
            SaveAction::None => Ok(()),
        }
    }

    /// Executes staged writes inside the session transaction.
    ///
    /// # Errors
    /// - `ConstraintViolation` when the store rejects a write.
    /// - `NotFound` when an update or delete target no longer exists.
    pub fn flush(&mut self) -> CrudResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        self.begin_if_needed()?;

        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        for write in staged {
            if let Err(err) = self.execute(write) {
                warn!(
                    "event=session_flush module=crud status=error writes={} error={}",
                    count, err
                );
                self.abort();
                return Err(err);
            }
        }

        debug!(
            "event=session_flush module=crud status=ok writes={}",
            count
        );
        Ok(())
    }

    /// Flushes staged writes and commits the session transaction.
    pub fn commit(&mut self) -> CrudResult<()> {
        self.flush()?;
        if !self.in_transaction {
            return Ok(());
        }

        if let Err(err) = self.conn.execute_batch("COMMIT;") {
            warn!(
                "event=session_commit module=crud status=error error={}",
                err
            );
            self.abort();
            return Err(err.into());
        }
        self.in_transaction = false;
        debug!("event=session_commit module=crud status=ok");
        Ok(())
    }

    /// Discards staged writes and rolls back the session transaction.
    pub fn rollback(&mut self) -> CrudResult<()> {
        let discarded = self.staged.len();
        self.staged.clear();
        self.inserted_ids.clear();
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("ROLLBACK;")?;
        }
        debug!(
            "event=session_rollback module=crud status=ok discarded_writes={}",
            discarded
        );
        Ok(())
    }

    pub(crate) fn stage_insert(&mut self, table: &'static str, columns: StagedColumns) -> StageTicket {
        let ticket = StageTicket(self.next_ticket);
        self.next_ticket += 1;
        self.staged.push(StagedWrite::Insert {
            ticket,
            table,
            columns,
        });
        ticket
    }

    pub(crate) fn stage_update(&mut self, table: &'static str, id: RecordId, columns: StagedColumns) {
        self.staged.push(StagedWrite::Update { table, id, columns });
    }

    pub(crate) fn stage_delete(&mut self, table: &'static str, id: RecordId) {
        self.staged.push(StagedWrite::Delete { table, id });
    }

    /// Row id generated for a staged insert, once it has been flushed.
    pub(crate) fn inserted_id(&self, ticket: StageTicket) -> Option<RecordId> {
        self.inserted_ids.get(&ticket).copied()
    }

    fn begin_if_needed(&mut self) -> CrudResult<()> {
        if !self.in_transaction && self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN;")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn execute(&mut self, write: StagedWrite) -> CrudResult<()> {
        match write {
            StagedWrite::Insert {
                ticket,
                table,
                columns,
            } => {
                let sql = if columns.is_empty() {
                    format!("INSERT INTO {table} DEFAULT VALUES;")
                } else {
                    let names = columns
                        .iter()
                        .map(|(name, _)| *name)
                        .collect::<Vec<_>>()
                        .join(", ");
                    let placeholders = (1..=columns.len())
                        .map(|index| format!("?{index}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("INSERT INTO {table} ({names}) VALUES ({placeholders});")
                };
                self.conn
                    .execute(&sql, params_from_iter(columns.into_iter().map(|(_, value)| value)))
                    .map_err(|err| map_write_error(table, err))?;
                self.inserted_ids
                    .insert(ticket, self.conn.last_insert_rowid());
            }
            StagedWrite::Update { table, id, columns } => {
                if columns.is_empty() {
                    return Ok(());
                }
                let assignments = columns
                    .iter()
                    .enumerate()
                    .map(|(index, (name, _))| format!("{name} = ?{}", index + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE {table} SET {assignments} WHERE {ID_COLUMN} = ?{};",
                    columns.len() + 1
                );
                let mut values: Vec<SqlValue> =
                    columns.into_iter().map(|(_, value)| value).collect();
                values.push(SqlValue::Integer(id));

                let changed = self
                    .conn
                    .execute(&sql, params_from_iter(values))
                    .map_err(|err| map_write_error(table, err))?;
                if changed == 0 {
                    return Err(CrudError::NotFound { table, id });
                }
            }
            StagedWrite::Delete { table, id } => {
                let changed = self
                    .conn
                    .execute(&format!("DELETE FROM {table} WHERE {ID_COLUMN} = ?1;"), [id])
                    .map_err(|err| map_write_error(table, err))?;
                if changed == 0 {
                    return Err(CrudError::NotFound { table, id });
                }
            }
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.staged.clear();
        self.inserted_ids.clear();
        if !self.in_transaction {
            return;
        }
        self.in_transaction = false;
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!(
                "event=session_rollback module=crud status=error error={}",
                err
            );
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!(
                "event=session_drop module=crud status=rollback discarded_writes={}",
                self.staged.len()
            );
            self.abort();
        }
    }
}

fn map_write_error(table: &'static str, err: rusqlite::Error) -> CrudError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            CrudError::ConstraintViolation {
                table,
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            }
        }
        _ => CrudError::from(err),
    }
}
