//! Generic record access layer.
//!
//! # Responsibility
//! - Provide entity-agnostic get/create/update/remove over one table per
//!   entity type, parameterized by the entity's field descriptors.
//! - Encode caller input into a JSON-compatible shape before it is written.
//! - Apply a caller-chosen persistence strategy after every write.
//!
//! # Invariants
//! - The layer never opens or closes connections; callers own the `Session`.
//! - Errors surface untouched. The only silent behavior is that `update`
//!   skips field names the entity does not declare.
//! - A missing row on `remove` is `CrudError::NotFound`, never a fault.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

mod base;
mod encode;
mod schema;
mod session;
mod user;

pub use base::CrudBase;
pub use encode::{EncodingPlan, FieldRule};
pub use schema::{Entity, EntitySchema, FieldDef, FieldKind, RecordId, ID_COLUMN};
pub use session::Session;
pub use user::{OtpCrud, UserCrud, UserLookup};

pub type CrudResult<T> = Result<T, CrudError>;

/// Errors raised by record access operations.
#[derive(Debug)]
pub enum CrudError {
    /// No row with the requested identifier exists.
    NotFound { table: &'static str, id: RecordId },
    /// The store rejected a write (unique, foreign key or check constraint).
    ConstraintViolation {
        table: &'static str,
        message: String,
    },
    /// Caller bug: unknown strategy token, unknown field, or a value that does
    /// not match the declared field type.
    Programming(String),
    /// Underlying SQLite error.
    Db(DbError),
    /// A persisted row could not be decoded into its entity type.
    InvalidData(String),
}

impl Display for CrudError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { table, id } => write!(f, "{table} record not found: {id}"),
            Self::ConstraintViolation { table, message } => {
                write!(f, "constraint violation on {table}: {message}")
            }
            Self::Programming(message) => write!(f, "programming error: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for CrudError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::ConstraintViolation { .. } => None,
            Self::Programming(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for CrudError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CrudError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// What happens to the session after a write is staged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SaveAction {
    /// Flush staged writes and commit the transaction.
    #[default]
    Commit,
    /// Execute staged writes inside the open transaction without committing.
    Flush,
    /// Leave the write staged; the caller finalizes the session later.
    None,
}

impl SaveAction {
    /// Stable token used in logs and text configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "COMMIT",
            Self::Flush => "FLUSH",
            Self::None => "NONE",
        }
    }

    /// Whether the write reaches the store before the operation returns.
    ///
    /// Entities are reloaded after persisting actions so generated fields are
    /// populated.
    pub fn persists(self) -> bool {
        match self {
            Self::Commit | Self::Flush => true,
            Self::None => false,
        }
    }
}

impl Display for SaveAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaveAction {
    type Err = CrudError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "COMMIT" => Ok(Self::Commit),
            "FLUSH" => Ok(Self::Flush),
            "NONE" => Ok(Self::None),
            other => Err(CrudError::Programming(format!(
                "unknown save action `{other}`; expected COMMIT|FLUSH|NONE"
            ))),
        }
    }
}
