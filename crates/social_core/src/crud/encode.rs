//! Per-field encoding rules.
//!
//! Enumeration fields are encoded by symbolic name so stored values survive a
//! renumbering of the underlying variants. Every other field is encoded by
//! its natural JSON shape, with timestamps normalized to UTC RFC 3339.

use super::schema::{EntitySchema, FieldKind, ID_COLUMN};
use super::{CrudError, CrudResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Encoding mode of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    ByName(&'static [&'static str]),
    Structural(FieldKind),
}

/// Rule table built once from an entity schema.
#[derive(Debug, Clone)]
pub struct EncodingPlan {
    table: &'static str,
    rules: HashMap<&'static str, FieldRule>,
}

impl EncodingPlan {
    pub fn for_schema(schema: &EntitySchema) -> Self {
        let mut rules = HashMap::with_capacity(schema.fields.len() + 1);
        rules.insert(ID_COLUMN, FieldRule::Structural(FieldKind::Integer));
        for field in schema.fields {
            let rule = match field.kind {
                FieldKind::Enumeration(variants) => FieldRule::ByName(variants),
                kind => FieldRule::Structural(kind),
            };
            rules.insert(field.name, rule);
        }

        Self {
            table: schema.table,
            rules,
        }
    }

    pub fn rule(&self, field: &str) -> Option<FieldRule> {
        self.rules.get(field).copied()
    }

    /// Serializes `input` and applies the field rules to every key.
    ///
    /// Keys without a rule pass through unchanged; callers decide whether an
    /// unknown key is an error (create) or ignored (update).
    ///
    /// # Errors
    /// - `Programming` when `input` does not serialize to a JSON object.
    /// - `Programming` when a value does not match its declared field type.
    pub fn encode<S: Serialize + ?Sized>(&self, input: &S) -> CrudResult<Map<String, Value>> {
        let value = serde_json::to_value(input).map_err(|err| {
            CrudError::Programming(format!("{} input is not serializable: {err}", self.table))
        })?;
        let Value::Object(fields) = value else {
            return Err(CrudError::Programming(format!(
                "{} input must encode to a JSON object, got {}",
                self.table,
                json_type_name(&value)
            )));
        };

        fields
            .into_iter()
            .map(|(name, value)| {
                let encoded = match self.rule(&name) {
                    Some(rule) => self.encode_value(&name, rule, value)?,
                    None => value,
                };
                Ok((name, encoded))
            })
            .collect()
    }

    /// Encodes one value under the rule registered for `field`.
    pub fn encode_field(&self, field: &str, value: Value) -> CrudResult<Value> {
        match self.rule(field) {
            Some(rule) => self.encode_value(field, rule, value),
            None => Err(CrudError::Programming(format!(
                "{} has no field `{field}`",
                self.table
            ))),
        }
    }

    fn encode_value(&self, field: &str, rule: FieldRule, value: Value) -> CrudResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        match rule {
            FieldRule::ByName(variants) => self.encode_by_name(field, variants, value),
            FieldRule::Structural(kind) => self.encode_structural(field, kind, value),
        }
    }

    fn encode_by_name(
        &self,
        field: &str,
        variants: &'static [&'static str],
        value: Value,
    ) -> CrudResult<Value> {
        let name = match &value {
            Value::String(name) => variants.iter().find(|variant| **variant == name.as_str()),
            Value::Number(number) => number
                .as_u64()
                .and_then(|index| usize::try_from(index).ok())
                .and_then(|index| variants.get(index)),
            _ => None,
        };

        match name {
            Some(name) => Ok(Value::String((*name).to_string())),
            None => Err(self.mismatch(
                field,
                &format!("one of {}", variants.join("|")),
                &value,
            )),
        }
    }

    fn encode_structural(&self, field: &str, kind: FieldKind, value: Value) -> CrudResult<Value> {
        if let FieldKind::Enumeration(variants) = kind {
            return self.encode_by_name(field, variants, value);
        }

        let accepted = match (kind, &value) {
            (FieldKind::Text, Value::String(_)) | (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::Integer, Value::Number(number)) => number.as_i64().is_some(),
            (FieldKind::Timestamp, Value::String(raw)) => {
                return normalize_timestamp(raw)
                    .map(Value::String)
                    .ok_or_else(|| self.mismatch(field, "an RFC 3339 timestamp", &value));
            }
            _ => false,
        };

        if accepted {
            Ok(value)
        } else {
            Err(self.mismatch(field, kind.label(), &value))
        }
    }

    fn mismatch(&self, field: &str, expected: &str, value: &Value) -> CrudError {
        CrudError::Programming(format!(
            "{}.{field} expects {expected}, got {}",
            self.table,
            json_type_name(value)
        ))
    }
}

/// Current time in the encoded timestamp format.
pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn normalize_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| format_timestamp(parsed.with_timezone(&Utc)))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_timestamp, EncodingPlan, FieldRule};
    use crate::crud::schema::{EntitySchema, FieldDef, FieldKind};
    use crate::crud::CrudError;
    use serde_json::json;

    const SCHEMA: EntitySchema = EntitySchema {
        table: "tickets",
        fields: &[
            FieldDef::text("title"),
            FieldDef::integer("points"),
            FieldDef::boolean("open"),
            FieldDef::timestamp("due_on"),
            FieldDef::enumeration("priority", &["LOW", "MEDIUM", "HIGH"]),
        ],
    };

    #[test]
    fn plan_maps_enumerations_to_by_name_rule() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        assert_eq!(
            plan.rule("priority"),
            Some(FieldRule::ByName(&["LOW", "MEDIUM", "HIGH"]))
        );
        assert_eq!(
            plan.rule("title"),
            Some(FieldRule::Structural(FieldKind::Text))
        );
        assert_eq!(
            plan.rule("id"),
            Some(FieldRule::Structural(FieldKind::Integer))
        );
        assert_eq!(plan.rule("unknown"), None);
    }

    #[test]
    fn enumeration_value_is_encoded_by_name() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        let encoded = plan.encode(&json!({ "priority": 2 })).unwrap();
        assert_eq!(encoded["priority"], "HIGH");

        let encoded = plan.encode(&json!({ "priority": "MEDIUM" })).unwrap();
        assert_eq!(encoded["priority"], "MEDIUM");
    }

    #[test]
    fn enumeration_rejects_unknown_name_and_out_of_range_value() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        assert!(matches!(
            plan.encode(&json!({ "priority": "URGENT" })),
            Err(CrudError::Programming(_))
        ));
        assert!(matches!(
            plan.encode(&json!({ "priority": 3 })),
            Err(CrudError::Programming(_))
        ));
    }

    #[test]
    fn structural_fields_keep_natural_shape_and_unknown_keys_pass_through() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        let encoded = plan
            .encode(&json!({
                "title": "fix login",
                "points": 3,
                "open": true,
                "extra": { "nested": [1, 2] }
            }))
            .unwrap();
        assert_eq!(encoded["title"], "fix login");
        assert_eq!(encoded["points"], 3);
        assert_eq!(encoded["open"], true);
        assert_eq!(encoded["extra"], json!({ "nested": [1, 2] }));
    }

    #[test]
    fn type_mismatch_is_a_programming_error() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        let err = plan.encode(&json!({ "points": "three" })).unwrap_err();
        match err {
            CrudError::Programming(message) => {
                assert!(message.contains("tickets.points"));
                assert!(message.contains("integer"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(plan.encode(&json!({ "open": 1 })).is_err());
        assert!(plan.encode(&json!({ "points": 1.5 })).is_err());
    }

    #[test]
    fn null_passes_through_every_rule() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        let encoded = plan
            .encode(&json!({ "title": null, "priority": null, "due_on": null }))
            .unwrap();
        assert!(encoded.values().all(|value| value.is_null()));
    }

    #[test]
    fn non_object_input_is_rejected() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        assert!(matches!(
            plan.encode(&json!(["title"])),
            Err(CrudError::Programming(_))
        ));
    }

    #[test]
    fn timestamps_are_normalized_to_utc_micros() {
        assert_eq!(
            normalize_timestamp("2026-02-13T10:00:00+02:00").as_deref(),
            Some("2026-02-13T08:00:00.000000Z")
        );
        assert_eq!(
            normalize_timestamp("2026-02-13T10:00:00.123Z").as_deref(),
            Some("2026-02-13T10:00:00.123000Z")
        );
        assert_eq!(normalize_timestamp("yesterday"), None);
    }

    #[test]
    fn encoding_is_idempotent() {
        let plan = EncodingPlan::for_schema(&SCHEMA);
        let once = plan
            .encode(&json!({
                "title": "t",
                "points": 5,
                "open": false,
                "due_on": "2026-02-13T10:00:00+05:30",
                "priority": 0,
                "extra": "kept"
            }))
            .unwrap();
        let twice = plan.encode(&once).unwrap();
        assert_eq!(once, twice);
    }
}
