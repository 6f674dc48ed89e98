//! User account record and registration payload.
//!
//! # Invariants
//! - `email` and `phone_number` are unique across all users (store-enforced).
//! - `password` holds a hash once the record has gone through registration.
//! - `modified_on` is refreshed by every update.

use crate::crud::{Entity, EntitySchema, FieldDef, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const USER_FIELDS: &[FieldDef] = &[
    FieldDef::text("name"),
    FieldDef::text("email"),
    FieldDef::integer("phone_number"),
    FieldDef::text("password"),
    FieldDef::timestamp("created_on"),
    FieldDef::timestamp("modified_on").touched_on_update(),
    FieldDef::boolean("is_active"),
    FieldDef::boolean("is_admin"),
];

/// Persisted user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub name: String,
    pub email: String,
    pub phone_number: i64,
    pub password: String,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
}

impl Entity for User {
    const SCHEMA: EntitySchema = EntitySchema {
        table: "users",
        fields: USER_FIELDS,
    };

    fn id(&self) -> Option<RecordId> {
        self.id
    }
}

/// Registration payload accepted by the HTTP endpoint.
///
/// Accepts both snake_case and camelCase keys; always serializes snake_case
/// so it encodes directly onto `User` columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    #[serde(alias = "phoneNumber")]
    pub phone_number: i64,
    pub name: String,
    pub password: String,
    #[serde(default, alias = "isAdmin")]
    pub is_admin: bool,
    #[serde(default, alias = "isActive")]
    pub is_active: bool,
}
