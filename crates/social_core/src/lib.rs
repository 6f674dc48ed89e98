//! Core domain logic for the social registration backend.
//! This crate owns persistence, encoding rules and account invariants.

pub mod auth;
pub mod config;
pub mod crud;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;

pub use auth::password::{Argon2PasswordHasher, HashError, PasswordHasher};
pub use config::{ConfigError, ConfigResult, Settings};
pub use crud::{
    CrudBase, CrudError, CrudResult, Entity, EntitySchema, OtpCrud, RecordId, SaveAction,
    Session, UserCrud, UserLookup,
};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::otp::Otp;
pub use model::user::{User, UserCreate};
pub use service::registration::{
    Registered, RegistrationError, RegistrationResult, RegistrationService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
