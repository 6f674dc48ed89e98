//! Credential handling collaborators.
//!
//! Only password hashing lives here; sessions and tokens are not part of the
//! backend.

pub mod password;
