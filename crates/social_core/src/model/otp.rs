//! One-time passcode issued to a user.

use crate::crud::{Entity, EntitySchema, FieldDef, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const OTP_FIELDS: &[FieldDef] = &[
    FieldDef::integer("user_id"),
    FieldDef::integer("otp"),
    FieldDef::timestamp("modified_on").touched_on_update(),
];

/// Persisted passcode. `user_id` must reference an existing user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otp {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub user_id: RecordId,
    pub otp: i64,
    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,
}

impl Entity for Otp {
    const SCHEMA: EntitySchema = EntitySchema {
        table: "otp",
        fields: OTP_FIELDS,
    };

    fn id(&self) -> Option<RecordId> {
        self.id
    }
}
