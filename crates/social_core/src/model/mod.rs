//! Entity records persisted by the social backend.
//!
//! # Responsibility
//! - Declare each table's record shape and field descriptors.
//! - Keep request payloads next to the record they create.
//!
//! # Invariants
//! - Store-generated fields (`id`, timestamps, flag defaults) deserialize when
//!   absent, so staged entities can be built before they are flushed.

pub mod otp;
pub mod user;
