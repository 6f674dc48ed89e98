//! Entity descriptors consumed by the generic record access layer.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Numeric primary key shared by every entity table.
pub type RecordId = i64;

/// Name of the primary key column in every entity table.
pub const ID_COLUMN: &str = "id";

/// Declared storage type of one entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    /// RFC 3339 text in UTC.
    Timestamp,
    /// Stored by symbolic name. Slice position is the underlying value.
    Enumeration(&'static [&'static str]),
}

impl FieldKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Enumeration(_) => "enumeration",
        }
    }
}

/// One named column of an entity table, excluding `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Set to the current time by every `update` that does not supply it.
    pub touch_on_update: bool,
}

impl FieldDef {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            touch_on_update: false,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    pub const fn enumeration(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self::new(name, FieldKind::Enumeration(variants))
    }

    /// Marks a timestamp as refreshed on every update.
    pub const fn touched_on_update(mut self) -> Self {
        self.touch_on_update = true;
        self
    }
}

/// Table name plus the ordered field set of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: &'static str,
    pub fields: &'static [FieldDef],
}

impl EntitySchema {
    /// Looks up a declared field. `id` is not a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Declared kind of `name`, including `id` as an integer.
    pub fn column_kind(&self, name: &str) -> Option<FieldKind> {
        if name == ID_COLUMN {
            return Some(FieldKind::Integer);
        }
        self.field(name).map(|field| field.kind)
    }

    /// `id` followed by every declared field, in declaration order.
    pub fn columns(&self) -> Vec<(&'static str, FieldKind)> {
        std::iter::once((ID_COLUMN, FieldKind::Integer))
            .chain(self.fields.iter().map(|field| (field.name, field.kind)))
            .collect()
    }
}

/// A record type managed by [`CrudBase`](super::CrudBase).
///
/// Implementors serialize to a JSON object whose keys are the column names
/// in `SCHEMA` plus `id`. Fields generated by the store (`id`, defaults)
/// must deserialize when absent, so a freshly staged entity can be built
/// before it reaches the database.
pub trait Entity: Serialize + DeserializeOwned {
    const SCHEMA: EntitySchema;

    /// `None` until the entity has been flushed to the store.
    fn id(&self) -> Option<RecordId>;
}
