//! Generic CRUD operations over one entity table.
//!
//! # Invariants
//! - Input is encoded through the entity's `EncodingPlan` on create and update.
//! - `create` rejects undeclared fields; `update` skips them.
//! - Persisting actions reload the entity so store-generated values are
//!   visible to the caller; `SaveAction::None` returns the in-memory entity.

use super::encode::{now_timestamp, EncodingPlan};
use super::schema::{Entity, EntitySchema, FieldKind, RecordId, ID_COLUMN};
use super::session::{Session, StagedColumns};
use super::{CrudError, CrudResult, SaveAction};
use log::{debug, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::Row;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::marker::PhantomData;

/// Record access for entity type `T`.
///
/// Build one per entity type and reuse it; the encoding plan is computed once
/// at construction.
pub struct CrudBase<T: Entity> {
    schema: EntitySchema,
    plan: EncodingPlan,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for CrudBase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> CrudBase<T> {
    pub fn new() -> Self {
        let schema = T::SCHEMA;
        Self {
            plan: EncodingPlan::for_schema(&schema),
            schema,
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn plan(&self) -> &EncodingPlan {
        &self.plan
    }

    /// Encodes any serializable input with this entity's field rules.
    pub fn encode<S: Serialize + ?Sized>(&self, input: &S) -> CrudResult<Map<String, Value>> {
        self.plan.encode(input)
    }

    /// Loads one entity by id. A miss is `Ok(None)`.
    pub fn get(&self, session: &Session<'_>, id: RecordId) -> CrudResult<Option<T>> {
        match self.load_columns(session, id, &self.schema.columns())? {
            Some(row) => self.decode_row(row).map(Some),
            None => Ok(None),
        }
    }

    /// Creates a new entity from `input` and applies `action`.
    ///
    /// # Errors
    /// - `Programming` for undeclared fields or values of the wrong type.
    /// - `ConstraintViolation` when a persisting action hits a store constraint.
    pub fn create<S: Serialize + ?Sized>(
        &self,
        session: &mut Session<'_>,
        input: &S,
        action: SaveAction,
    ) -> CrudResult<T> {
        let mut encoded = self.plan.encode(input)?;
        if let Some(unknown) = encoded
            .keys()
            .find(|name| self.schema.column_kind(name).is_none())
        {
            return Err(CrudError::Programming(format!(
                "{} has no field `{unknown}`",
                self.schema.table
            )));
        }
        // Null means "not supplied": the store default applies.
        encoded.retain(|_, value| !value.is_null());

        let entity = self.build(encoded.clone())?;
        let columns = self.staged_columns(&encoded)?;
        let ticket = session.stage_insert(self.schema.table, columns);
        session.handle(action)?;

        if !action.persists() {
            debug!(
                "event=crud_create module=crud status=staged table={}",
                self.schema.table
            );
            return Ok(entity);
        }

        let id = session.inserted_id(ticket).ok_or_else(|| {
            CrudError::Programming(format!(
                "{} insert was not flushed by {action}",
                self.schema.table
            ))
        })?;
        let created = self.reload(session, id)?;
        info!(
            "event=crud_create module=crud status=ok table={} id={} action={}",
            self.schema.table, id, action
        );
        Ok(created)
    }

    /// Applies `input` to an existing entity and applies `action`.
    ///
    /// Field names the entity does not declare, and `id`, are skipped.
    /// `refresh_fields` limits the reload to the named columns; `None`
    /// reloads the whole row.
    pub fn update<S: Serialize + ?Sized>(
        &self,
        session: &mut Session<'_>,
        entity: T,
        input: &S,
        refresh_fields: Option<&[&str]>,
        action: SaveAction,
    ) -> CrudResult<T> {
        let id = entity.id().ok_or_else(|| {
            CrudError::Programming(format!(
                "cannot update {} entity without an identifier",
                self.schema.table
            ))
        })?;
        let refresh_columns = refresh_fields
            .map(|fields| self.refresh_columns(fields))
            .transpose()?;

        let changes = self.plan.encode(input)?;
        let mut current = self.plan.encode(&entity)?;
        let mut columns: StagedColumns = Vec::new();
        for (name, value) in changes {
            match self.schema.field(&name) {
                Some(field) => {
                    columns.push((field.name, json_to_sql(&value)));
                    current.insert(name, value);
                }
                None => debug!(
                    "event=crud_update module=crud status=ignored_field table={} field={}",
                    self.schema.table, name
                ),
            }
        }

        let now = now_timestamp();
        for field in self.schema.fields.iter().filter(|field| field.touch_on_update) {
            if columns.iter().any(|(name, _)| *name == field.name) {
                continue;
            }
            columns.push((field.name, SqlValue::Text(now.clone())));
            current.insert(field.name.to_string(), Value::String(now.clone()));
        }

        let updated = self.build(current)?;
        session.stage_update(self.schema.table, id, columns);
        session.handle(action)?;

        if !action.persists() {
            debug!(
                "event=crud_update module=crud status=staged table={} id={}",
                self.schema.table, id
            );
            return Ok(updated);
        }

        let refreshed = match refresh_columns {
            None => self.reload(session, id)?,
            Some(columns) => self.refresh_partial(session, updated, id, &columns)?,
        };
        info!(
            "event=crud_update module=crud status=ok table={} id={} action={}",
            self.schema.table, id, action
        );
        Ok(refreshed)
    }

    /// Deletes the entity with `id` and returns its last loaded state.
    ///
    /// # Errors
    /// - `NotFound` when no row has this id.
    pub fn remove(
        &self,
        session: &mut Session<'_>,
        id: RecordId,
        action: SaveAction,
    ) -> CrudResult<T> {
        let entity = self.get(session, id)?.ok_or(CrudError::NotFound {
            table: self.schema.table,
            id,
        })?;
        session.stage_delete(self.schema.table, id);
        session.handle(action)?;
        info!(
            "event=crud_remove module=crud status=ok table={} id={} action={}",
            self.schema.table, id, action
        );
        Ok(entity)
    }

    /// First entity (lowest id) whose `field` equals `value`.
    ///
    /// Building block for entity-specific lookups such as lookup-by-email.
    pub(crate) fn find_one_by(
        &self,
        session: &Session<'_>,
        field: &str,
        value: Value,
    ) -> CrudResult<Option<T>> {
        let Some(field_def) = self.schema.field(field) else {
            return Err(CrudError::Programming(format!(
                "{} has no field `{field}`",
                self.schema.table
            )));
        };
        let encoded = self.plan.encode_field(field_def.name, value)?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {ID_COLUMN} ASC LIMIT 1;",
            column_list(&self.schema.columns()),
            self.schema.table,
            field_def.name
        );
        let mut stmt = session.connection().prepare(&sql)?;
        let mut rows = stmt.query([json_to_sql(&encoded)])?;
        match rows.next()? {
            Some(row) => {
                let decoded = decode_columns(row, &self.schema.columns())?;
                self.decode_row(decoded).map(Some)
            }
            None => Ok(None),
        }
    }

    fn reload(&self, session: &Session<'_>, id: RecordId) -> CrudResult<T> {
        self.get(session, id)?.ok_or(CrudError::NotFound {
            table: self.schema.table,
            id,
        })
    }

    fn refresh_partial(
        &self,
        session: &Session<'_>,
        entity: T,
        id: RecordId,
        columns: &[(&'static str, FieldKind)],
    ) -> CrudResult<T> {
        if columns.is_empty() {
            return Ok(entity);
        }
        let fresh = self
            .load_columns(session, id, columns)?
            .ok_or(CrudError::NotFound {
                table: self.schema.table,
                id,
            })?;
        let mut current = self.plan.encode(&entity)?;
        current.extend(fresh);
        self.build(current)
    }

    fn refresh_columns(&self, fields: &[&str]) -> CrudResult<Vec<(&'static str, FieldKind)>> {
        fields
            .iter()
            .map(|name| {
                self.schema
                    .columns()
                    .into_iter()
                    .find(|(column, _)| column == name)
                    .ok_or_else(|| {
                        CrudError::Programming(format!(
                            "cannot refresh unknown field `{name}` on {}",
                            self.schema.table
                        ))
                    })
            })
            .collect()
    }

    fn load_columns(
        &self,
        session: &Session<'_>,
        id: RecordId,
        columns: &[(&'static str, FieldKind)],
    ) -> CrudResult<Option<Map<String, Value>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {ID_COLUMN} = ?1;",
            column_list(columns),
            self.schema.table
        );
        let mut stmt = session.connection().prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => decode_columns(row, columns).map(Some),
            None => Ok(None),
        }
    }

    fn staged_columns(&self, encoded: &Map<String, Value>) -> CrudResult<StagedColumns> {
        encoded
            .iter()
            .map(|(name, value)| {
                let column = if name == ID_COLUMN {
                    ID_COLUMN
                } else {
                    self.schema
                        .field(name)
                        .map(|field| field.name)
                        .ok_or_else(|| {
                            CrudError::Programming(format!(
                                "{} has no field `{name}`",
                                self.schema.table
                            ))
                        })?
                };
                Ok((column, json_to_sql(value)))
            })
            .collect()
    }

    /// Builds an entity from caller-supplied values.
    fn build(&self, fields: Map<String, Value>) -> CrudResult<T> {
        serde_json::from_value(Value::Object(fields)).map_err(|err| {
            CrudError::Programming(format!(
                "input does not match the {} schema: {err}",
                self.schema.table
            ))
        })
    }

    /// Builds an entity from a persisted row.
    fn decode_row(&self, fields: Map<String, Value>) -> CrudResult<T> {
        serde_json::from_value(Value::Object(fields)).map_err(|err| {
            CrudError::InvalidData(format!("{} row cannot be decoded: {err}", self.schema.table))
        })
    }
}

fn column_list(columns: &[(&'static str, FieldKind)]) -> String {
    columns
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode_columns(
    row: &Row<'_>,
    columns: &[(&'static str, FieldKind)],
) -> CrudResult<Map<String, Value>> {
    let mut fields = Map::with_capacity(columns.len());
    for (index, (name, kind)) in columns.iter().enumerate() {
        let value = match kind {
            FieldKind::Integer => row
                .get::<_, Option<i64>>(index)?
                .map_or(Value::Null, Value::from),
            FieldKind::Boolean => match row.get::<_, Option<i64>>(index)? {
                None => Value::Null,
                Some(0) => Value::Bool(false),
                Some(1) => Value::Bool(true),
                Some(other) => {
                    return Err(CrudError::InvalidData(format!(
                        "invalid boolean value `{other}` in column `{name}`"
                    )));
                }
            },
            FieldKind::Text | FieldKind::Timestamp => row
                .get::<_, Option<String>>(index)?
                .map_or(Value::Null, Value::String),
            FieldKind::Enumeration(variants) => match row.get::<_, Option<String>>(index)? {
                None => Value::Null,
                Some(variant) if variants.iter().any(|known| *known == variant) => {
                    Value::String(variant)
                }
                Some(other) => {
                    return Err(CrudError::InvalidData(format!(
                        "invalid enumeration value `{other}` in column `{name}`"
                    )));
                }
            },
        };
        fields.insert((*name).to_string(), value);
    }
    Ok(fields)
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number_to_sql(number),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn number_to_sql(number: &Number) -> SqlValue {
    match number.as_i64() {
        Some(integer) => SqlValue::Integer(integer),
        None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
    }
}
