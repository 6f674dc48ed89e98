//! Entity-specific access on top of `CrudBase`.

use super::{CrudBase, CrudResult, Session};
use crate::model::otp::Otp;
use crate::model::user::User;
use serde_json::Value;

pub type UserCrud = CrudBase<User>;
pub type OtpCrud = CrudBase<Otp>;

/// Lookups only meaningful for user records.
pub trait UserLookup {
    /// Finds the account registered with `email`, if any. Exact match.
    fn get_by_email(&self, session: &Session<'_>, email: &str) -> CrudResult<Option<User>>;
}

impl UserLookup for CrudBase<User> {
    fn get_by_email(&self, session: &Session<'_>, email: &str) -> CrudResult<Option<User>> {
        self.find_one_by(session, "email", Value::String(email.to_string()))
    }
}
