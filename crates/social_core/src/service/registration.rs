//! User registration use-case.
//!
//! # Responsibility
//! - Reject registrations for an email that already has an account.
//! - Hash the password before anything reaches the store.
//! - Persist the account through the generic record access layer.
//!
//! # Invariants
//! - Plaintext passwords are never persisted or logged.
//! - A duplicate that slips past the email lookup still fails with the
//!   store's `ConstraintViolation`.

use crate::auth::password::{HashError, PasswordHasher};
use crate::crud::{CrudError, SaveAction, Session, UserCrud, UserLookup};
use crate::model::user::{User, UserCreate};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RegistrationResult<T> = Result<T, RegistrationError>;

#[derive(Debug)]
pub enum RegistrationError {
    /// An account with this email already exists.
    EmailTaken(String),
    Hash(HashError),
    Crud(CrudError),
}

impl Display for RegistrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailTaken(email) => write!(f, "email already registered: {email}"),
            Self::Hash(err) => write!(f, "{err}"),
            Self::Crud(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RegistrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::EmailTaken(_) => None,
            Self::Hash(err) => Some(err),
            Self::Crud(err) => Some(err),
        }
    }
}

impl From<HashError> for RegistrationError {
    fn from(value: HashError) -> Self {
        Self::Hash(value)
    }
}

impl From<CrudError> for RegistrationError {
    fn from(value: CrudError) -> Self {
        Self::Crud(value)
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    /// Stored account, reloaded after commit.
    pub user: User,
    /// Submitted payload with the password replaced by its hash.
    pub payload: UserCreate,
}

/// Registration service over a pluggable password hasher.
pub struct RegistrationService<H: PasswordHasher> {
    users: UserCrud,
    hasher: H,
}

impl<H: PasswordHasher> RegistrationService<H> {
    pub fn new(hasher: H) -> Self {
        Self {
            users: UserCrud::new(),
            hasher,
        }
    }

    pub fn users(&self) -> &UserCrud {
        &self.users
    }

    /// Registers a new account and commits it.
    ///
    /// # Errors
    /// - `EmailTaken` when the lookup finds an existing account.
    /// - `Crud(ConstraintViolation)` when email or phone number collide in
    ///   the store.
    pub fn register(
        &self,
        session: &mut Session<'_>,
        mut payload: UserCreate,
    ) -> RegistrationResult<Registered> {
        if self.users.get_by_email(session, &payload.email)?.is_some() {
            warn!("event=user_register module=service status=rejected reason=email_taken");
            return Err(RegistrationError::EmailTaken(payload.email));
        }

        payload.password = self.hasher.hash(&payload.password)?;
        let user = self.users.create(session, &payload, SaveAction::Commit)?;
        info!(
            "event=user_register module=service status=ok user_id={}",
            user.id.unwrap_or_default()
        );

        Ok(Registered { user, payload })
    }
}
